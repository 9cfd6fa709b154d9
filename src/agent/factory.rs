use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::GatewayError;
use crate::llm::{GenerateOptions, ProviderFactory};

use super::clock::Clock;
use super::registry::SharedAgent;
use super::{Agent, ChatAgent};

/// Agent types accepted by `AgentFactory::create`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AgentKind {
    Chat,
    Basic,
}

impl AgentKind {
    /// Parse an agent type name. Unknown names fall back to `Chat`.
    pub fn parse(name: &str) -> Self {
        match name {
            "chat" => AgentKind::Chat,
            "basic" => AgentKind::Basic,
            other => {
                tracing::debug!(agent_type = %other, "unknown agent type, using chat");
                AgentKind::Chat
            }
        }
    }
}

pub(crate) fn supported_agent_types() -> &'static [&'static str] {
    &["basic", "chat"]
}

/// Builds validated agents.
pub(crate) struct AgentFactory {
    providers: ProviderFactory,
    system_prompt: String,
    options: GenerateOptions,
    clock: Arc<dyn Clock>,
}

impl AgentFactory {
    pub fn new(
        providers: ProviderFactory,
        system_prompt: impl Into<String>,
        options: GenerateOptions,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            providers,
            system_prompt: system_prompt.into(),
            options,
            clock,
        }
    }

    pub fn providers(&self) -> &ProviderFactory {
        &self.providers
    }

    /// Build a provider, validate its model, then wrap it in an agent.
    ///
    /// Each call constructs a fresh provider, so agents never share one.
    pub async fn create(
        &self,
        agent_type: &str,
        provider_id: &str,
        api_key: &str,
        model_name: &str,
    ) -> Result<SharedAgent, GatewayError> {
        let provider = self.providers.create(provider_id, api_key, model_name)?;

        if !provider.validate_model().await {
            return Err(GatewayError::ModelNotFound {
                model_name: model_name.to_string(),
                provider_id: provider_id.to_string(),
            });
        }

        let agent: Box<dyn Agent> = match AgentKind::parse(agent_type) {
            // Both kinds share the chat behavior today.
            AgentKind::Chat | AgentKind::Basic => Box::new(ChatAgent::new(
                provider,
                self.system_prompt.clone(),
                self.options.clone(),
                self.clock.clone(),
            )),
        };

        tracing::info!(provider = %provider_id, model = %model_name, "agent created");
        Ok(Arc::new(Mutex::new(agent)))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::*;
    use crate::agent::clock::SystemClock;
    use crate::llm::mock::{self, MockProvider};
    use crate::llm::{Provider, ProviderError, ProviderSettings};

    fn factory_with(template: MockProvider) -> AgentFactory {
        let mut providers = ProviderFactory::with_defaults(Duration::from_secs(1), HashMap::new());
        mock::register(&mut providers, template);
        AgentFactory::new(
            providers,
            "sys",
            GenerateOptions::default(),
            Arc::new(SystemClock),
        )
    }

    #[test]
    fn test_agent_kind_parse() {
        assert_eq!(AgentKind::parse("chat"), AgentKind::Chat);
        assert_eq!(AgentKind::parse("basic"), AgentKind::Basic);
        assert_eq!(AgentKind::parse("something-else"), AgentKind::Chat);
    }

    #[tokio::test]
    async fn test_create_validates_before_building_agent() {
        let template = MockProvider::new("m");
        let factory = factory_with(template.clone());

        let agent = factory.create("chat", "mock", "key", "gpt-4").await.unwrap();

        assert_eq!(template.validate_calls(), 1);
        let agent = agent.lock().await;
        assert_eq!(agent.provider_name(), "mock");
        assert_eq!(agent.model_name(), "gpt-4");
        assert!(agent.history().is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_model() {
        let template = MockProvider::new("m").with_valid(false);
        let factory = factory_with(template.clone());

        let err = factory
            .create("chat", "mock", "key", "no-such-model")
            .await
            .err()
            .unwrap();

        match err {
            GatewayError::ModelNotFound {
                model_name,
                provider_id,
            } => {
                assert_eq!(model_name, "no-such-model");
                assert_eq!(provider_id, "mock");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(template.generate_calls(), 0);
    }

    #[tokio::test]
    async fn test_create_unsupported_provider_makes_no_calls() {
        let template = MockProvider::new("m");
        let factory = factory_with(template.clone());

        let err = factory.create("chat", "bogus", "key", "gpt-4").await.err().unwrap();

        assert!(matches!(err, GatewayError::UnsupportedProvider(ref id) if id == "bogus"));
        assert_eq!(template.constructed(), 0);
        assert_eq!(template.validate_calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_agent_type_falls_back_to_chat() {
        let factory = factory_with(MockProvider::new("m"));
        let agent = factory.create("wizard", "mock", "key", "m").await.unwrap();
        let reply = agent.lock().await.process_message("hi").await;
        assert_eq!(reply, "mock response");
    }

    #[tokio::test]
    async fn test_each_agent_gets_its_own_provider() {
        let template = MockProvider::new("m");
        let factory = factory_with(template.clone());

        let a = factory.create("chat", "mock", "key", "m").await.unwrap();
        let b = factory.create("basic", "mock", "key", "m").await.unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(template.constructed(), 2);
        a.lock().await.process_message("only a").await;
        assert!(b.lock().await.history().is_empty());
    }

    #[tokio::test]
    async fn test_openai_scenario_with_mocked_validation() {
        // "openai" backed by a scripted provider so no network is touched.
        let template = MockProvider::new("gpt-4").with_responses(vec![Ok("4".to_string())]);
        let mut providers = ProviderFactory::new(Duration::from_secs(1), HashMap::new());
        let t = template.clone();
        providers.register(
            "openai",
            Arc::new(
                move |_: ProviderSettings| -> Result<Arc<dyn Provider>, ProviderError> {
                    Ok(Arc::new(t.clone()))
                },
            ),
        );
        let factory = AgentFactory::new(
            providers,
            "sys",
            GenerateOptions::default(),
            Arc::new(SystemClock),
        );

        let agent = factory.create("chat", "openai", "sk", "gpt-4").await.unwrap();
        let mut agent = agent.lock().await;
        let reply = agent.process_message("2+2?").await;

        assert!(!reply.is_empty());
        assert_eq!(agent.history().len(), 2);
    }
}
