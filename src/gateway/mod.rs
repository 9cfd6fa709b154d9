// Request-level orchestration: credential checks, agent lookup, transcript
// recording and the two delivery modes.
//
// A turn always runs in its own task. Dropping a caller's future or stream
// stops delivery but never cuts a generation short, so the agent history and
// the transcript always receive the reply.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures_util::stream::{self, BoxStream, StreamExt};
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::agent::clock::{Clock, SystemClock};
use crate::agent::factory::AgentFactory;
use crate::agent::registry::AgentRegistry;
use crate::agent::stream::{replay, Chunk};
use crate::agent::types::Role;
use crate::config::{self, Config};
use crate::error::GatewayError;
use crate::llm::ProviderFactory;
use crate::store::{
    ChatSession, KeyStore, ProviderKey, SessionStore, SessionSummary, TranscriptMessage,
};

/// A chat message addressed to one provider/model.
#[derive(Debug, Clone)]
pub(crate) struct MessageRequest {
    pub message: String,
    pub provider_id: String,
    pub model_name: String,
}

/// A recorded user turn and the reply to it.
#[derive(Debug, Clone)]
pub(crate) struct Exchange {
    pub user: TranscriptMessage,
    pub assistant: TranscriptMessage,
}

/// Events of an incremental delivery, in emission order.
///
/// A stream ends with exactly one `Complete` or `Error`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub(crate) enum DeliveryEvent {
    UserMessage(TranscriptMessage),
    /// The assistant message about to be revealed, with empty content.
    Start(TranscriptMessage),
    Chunk(Chunk),
    Complete(TranscriptMessage),
    Error { error: String },
}

pub(crate) struct Gateway {
    registry: AgentRegistry,
    keys: KeyStore,
    sessions: SessionStore,
    clock: Arc<dyn Clock>,
    stream_delay: Duration,
}

impl Gateway {
    pub fn new(
        registry: AgentRegistry,
        keys: KeyStore,
        sessions: SessionStore,
        clock: Arc<dyn Clock>,
        stream_delay: Duration,
    ) -> Self {
        Self {
            registry,
            keys,
            sessions,
            clock,
            stream_delay,
        }
    }

    /// Wire up stores, factories and the registry from configuration.
    pub fn open(config: &Config) -> Result<Self> {
        let data_dir = config::resolve_data_dir(config)?;
        let keys = KeyStore::open(data_dir.join("api_keys.json"))?;
        let sessions = SessionStore::open(data_dir.join("chat_sessions.json"))?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let providers =
            ProviderFactory::with_defaults(config.request_timeout(), config.base_urls.clone());
        let factory = AgentFactory::new(
            providers,
            config.system_prompt.clone(),
            config.generate_options(),
            clock.clone(),
        );
        let registry = AgentRegistry::new(factory, config.agent_type.clone());

        Ok(Self::new(
            registry,
            keys,
            sessions,
            clock,
            config.stream_delay(),
        ))
    }

    fn providers(&self) -> &ProviderFactory {
        self.registry.factory().providers()
    }

    // -----------------------------------------------------------------------
    // Provider keys
    // -----------------------------------------------------------------------

    pub fn supported_providers(&self) -> Vec<String> {
        self.providers().supported_providers()
    }

    /// Store a key after proving it works with the first listed model.
    pub async fn add_provider_key(
        &self,
        provider_id: &str,
        api_key: &str,
        models: Vec<String>,
    ) -> Result<(), GatewayError> {
        if provider_id.is_empty() || api_key.is_empty() {
            return Err(GatewayError::InvalidRequest(
                "Provider and API key are required".to_string(),
            ));
        }
        let Some(first_model) = models.first() else {
            return Err(GatewayError::InvalidRequest(
                "At least one model must be specified".to_string(),
            ));
        };

        let provider = self.providers().create(provider_id, api_key, first_model)?;
        if !provider.validate_model().await {
            return Err(GatewayError::ModelNotFound {
                model_name: first_model.clone(),
                provider_id: provider_id.to_string(),
            });
        }

        self.keys.insert(
            provider_id,
            ProviderKey {
                key: api_key.to_string(),
                models,
                created_at: self.clock.now(),
            },
        )?;
        tracing::info!(provider = %provider_id, "API key saved");
        Ok(())
    }

    /// Configured providers and their allowed models.
    pub fn list_providers(&self) -> BTreeMap<String, Vec<String>> {
        self.keys.list()
    }

    pub fn remove_provider_key(&self, provider_id: &str) -> Result<(), GatewayError> {
        if !self.keys.remove(provider_id)? {
            return Err(GatewayError::ProviderNotConfigured(provider_id.to_string()));
        }
        tracing::info!(provider = %provider_id, "API key deleted");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Sessions
    // -----------------------------------------------------------------------

    pub fn create_session(&self) -> Result<ChatSession, GatewayError> {
        let session = self.sessions.create(self.clock.now())?;
        tracing::info!(session = %session.id, "created chat session");
        Ok(session)
    }

    pub fn list_sessions(&self) -> Vec<SessionSummary> {
        self.sessions.list()
    }

    pub fn session(&self, session_id: &str) -> Result<ChatSession, GatewayError> {
        self.sessions
            .get(session_id)
            .ok_or_else(|| GatewayError::SessionNotFound(session_id.to_string()))
    }

    pub fn messages(&self, session_id: &str) -> Result<Vec<TranscriptMessage>, GatewayError> {
        Ok(self.session(session_id)?.messages)
    }

    /// Delete a session's transcript and every agent serving it.
    pub async fn delete_session(&self, session_id: &str) -> Result<(), GatewayError> {
        // Transcript first; a turn that then finds it gone evicts its own agent.
        if !self.sessions.delete(session_id)? {
            return Err(GatewayError::SessionNotFound(session_id.to_string()));
        }
        self.registry.evict_session(session_id).await;
        tracing::info!(session = %session_id, "deleted chat session");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Chat
    // -----------------------------------------------------------------------

    /// Forget the conversation context of one live agent. The transcript is
    /// kept. Returns `false` if no agent is live for that key.
    pub async fn clear_context(
        &self,
        session_id: &str,
        provider_id: &str,
        model_name: &str,
    ) -> bool {
        match self.registry.get(session_id, provider_id, model_name).await {
            Some(agent) => {
                agent.lock().await.clear_history();
                tracing::info!(
                    session = %session_id,
                    provider = %provider_id,
                    model = %model_name,
                    "cleared agent context"
                );
                true
            }
            None => false,
        }
    }

    pub async fn live_agents(&self) -> usize {
        self.registry.len().await
    }

    /// Run one turn and return the recorded assistant message.
    pub async fn send_message(
        self: &Arc<Self>,
        session_id: &str,
        request: MessageRequest,
    ) -> Result<TranscriptMessage, GatewayError> {
        let handle = self.spawn_turn(session_id.to_string(), request);
        let exchange = join_turn(handle).await?;
        Ok(exchange.assistant)
    }

    /// Run one turn and replay the reply as a paced event stream.
    ///
    /// Generation starts immediately; the stream only controls delivery.
    pub fn stream_message(
        self: &Arc<Self>,
        session_id: &str,
        request: MessageRequest,
    ) -> BoxStream<'static, DeliveryEvent> {
        let handle = self.spawn_turn(session_id.to_string(), request);
        let delay = self.stream_delay;

        stream::once(join_turn(handle))
            .flat_map(move |result| match result {
                Ok(exchange) => delivery_events(exchange, delay),
                Err(e) => stream::once(async move {
                    DeliveryEvent::Error {
                        error: format!("Failed to generate response: {e}"),
                    }
                })
                .boxed(),
            })
            .boxed()
    }

    fn spawn_turn(
        self: &Arc<Self>,
        session_id: String,
        request: MessageRequest,
    ) -> JoinHandle<Result<Exchange, GatewayError>> {
        let gateway = self.clone();
        tokio::spawn(async move { gateway.run_turn(&session_id, &request).await })
    }

    async fn run_turn(
        &self,
        session_id: &str,
        request: &MessageRequest,
    ) -> Result<Exchange, GatewayError> {
        if !self.sessions.contains(session_id) {
            return Err(GatewayError::SessionNotFound(session_id.to_string()));
        }
        if request.message.is_empty()
            || request.provider_id.is_empty()
            || request.model_name.is_empty()
        {
            return Err(GatewayError::InvalidRequest(
                "Message, model_provider, and model_name are required".to_string(),
            ));
        }

        let key = self
            .keys
            .get(&request.provider_id)
            .ok_or_else(|| GatewayError::ProviderNotConfigured(request.provider_id.clone()))?;
        if !key.models.contains(&request.model_name) {
            return Err(GatewayError::ModelNotConfigured {
                model_name: request.model_name.clone(),
                provider_id: request.provider_id.clone(),
            });
        }

        let agent = self
            .registry
            .get_or_create(
                session_id,
                &request.provider_id,
                &request.model_name,
                &key.key,
            )
            .await?;

        // The transcript is appended under the agent lock so it records turns
        // in the same order as the agent's history.
        let mut agent = agent.lock().await;
        let asked_at = self.clock.now();
        let reply = agent.process_message(&request.message).await;
        let (user_at, reply_at) = {
            let history = agent.history();
            let user_at = history.len().checked_sub(2).map(|i| history[i].timestamp());
            let reply_at = history.last().map(|m| m.timestamp());
            (user_at.unwrap_or(asked_at), reply_at.unwrap_or_else(|| self.clock.now()))
        };
        let user = TranscriptMessage {
            role: Role::User,
            content: request.message.clone(),
            timestamp: user_at,
            model: None,
        };
        let assistant = TranscriptMessage {
            role: Role::Assistant,
            content: reply,
            timestamp: reply_at,
            model: Some(format!("{}/{}", request.provider_id, request.model_name)),
        };
        tracing::debug!(
            session = %session_id,
            provider = agent.provider_name(),
            model = %agent.model_name(),
            turns = agent.history().len(),
            "turn complete"
        );

        let recorded =
            self.sessions
                .append_exchange(session_id, user.clone(), assistant.clone())?;
        drop(agent);

        if !recorded {
            // The session was deleted mid-turn; this turn may have created an
            // agent after the eviction ran.
            self.registry.evict_session(session_id).await;
            tracing::warn!(session = %session_id, "session deleted during generation, reply not recorded");
        }

        Ok(Exchange { user, assistant })
    }
}

async fn join_turn(
    handle: JoinHandle<Result<Exchange, GatewayError>>,
) -> Result<Exchange, GatewayError> {
    match handle.await {
        Ok(result) => result,
        Err(e) => Err(GatewayError::Store(anyhow::anyhow!("turn task failed: {e}"))),
    }
}

fn delivery_events(exchange: Exchange, delay: Duration) -> BoxStream<'static, DeliveryEvent> {
    let Exchange { user, assistant } = exchange;
    let start = TranscriptMessage {
        content: String::new(),
        ..assistant.clone()
    };
    let text = assistant.content.clone();

    stream::iter([DeliveryEvent::UserMessage(user), DeliveryEvent::Start(start)])
        .chain(replay(text, delay).map(DeliveryEvent::Chunk))
        .chain(stream::once(async move { DeliveryEvent::Complete(assistant) }))
        .boxed()
}
