pub(crate) mod clock;
pub(crate) mod factory;
pub(crate) mod registry;
pub(crate) mod stream;
pub(crate) mod types;

use std::sync::Arc;

use async_trait::async_trait;

use crate::llm::{GenerateOptions, Provider};

use self::clock::Clock;
use self::types::{ContextMessage, Message, Role};

pub(crate) const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful AI assistant. Provide clear, accurate, and helpful responses.";

/// Prefix of the assistant turn recorded when generation fails.
pub(crate) const GENERATION_ERROR_PREFIX: &str = "Error generating response: ";

// ---------------------------------------------------------------------------
// Trait -- agent types implement this
// ---------------------------------------------------------------------------

/// A conversation bound to one provider.
///
/// Not safe to drive concurrently: callers hold the agent's lock for the
/// whole `process_message` call (see `registry::SharedAgent`).
#[async_trait]
pub(crate) trait Agent: Send + Sync {
    /// Record `text` as a user turn, generate a reply and record it.
    ///
    /// Always returns text: a provider failure is recorded and returned as an
    /// error description instead of being raised.
    async fn process_message(&mut self, text: &str) -> String;

    fn clear_history(&mut self);

    /// History as `{role, content}` pairs, oldest first.
    fn get_context(&self) -> Vec<ContextMessage>;

    fn history(&self) -> &[Message];

    fn provider_name(&self) -> &'static str;

    fn model_name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Chat agent
// ---------------------------------------------------------------------------

/// General-purpose conversational agent with a fixed system prompt.
pub(crate) struct ChatAgent {
    provider: Arc<dyn Provider>,
    history: Vec<Message>,
    system_prompt: String,
    options: GenerateOptions,
    clock: Arc<dyn Clock>,
}

impl ChatAgent {
    pub fn new(
        provider: Arc<dyn Provider>,
        system_prompt: impl Into<String>,
        options: GenerateOptions,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            provider,
            history: Vec::new(),
            system_prompt: system_prompt.into(),
            options,
            clock,
        }
    }

    fn record(&mut self, role: Role, content: &str) {
        self.history
            .push(Message::new(role, content, self.clock.now()));
    }
}

#[async_trait]
impl Agent for ChatAgent {
    async fn process_message(&mut self, text: &str) -> String {
        self.record(Role::User, text);

        let mut context = Vec::with_capacity(self.history.len() + 1);
        context.push(ContextMessage::system(&self.system_prompt));
        context.extend(self.get_context());

        let reply = match self
            .provider
            .generate_response(&context, &self.options)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(
                    provider = self.provider.provider_name(),
                    model = %self.provider.model_name(),
                    error = %e,
                    "generation failed"
                );
                format!("{GENERATION_ERROR_PREFIX}{e}")
            }
        };

        self.record(Role::Assistant, &reply);
        reply
    }

    fn clear_history(&mut self) {
        self.history.clear();
    }

    fn get_context(&self) -> Vec<ContextMessage> {
        self.history.iter().map(Message::to_context).collect()
    }

    fn history(&self) -> &[Message] {
        &self.history
    }

    fn provider_name(&self) -> &'static str {
        self.provider.provider_name()
    }

    fn model_name(&self) -> &str {
        self.provider.model_name()
    }
}
