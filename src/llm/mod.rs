// LLM provider abstraction.
//
// Each vendor implements the Provider trait; the ProviderFactory maps a
// provider identifier to a constructor. Adding a vendor means adding one
// module here and one `register` call in `ProviderFactory::with_defaults`.

pub(crate) mod anthropic;
pub(crate) mod deepseek;
pub(crate) mod http;
#[cfg(test)]
pub(crate) mod mock;
pub(crate) mod models;
pub(crate) mod openai;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::agent::types::ContextMessage;
use crate::error::GatewayError;

pub(crate) const DEFAULT_MAX_TOKENS: u32 = 1000;
pub(crate) const DEFAULT_TEMPERATURE: f32 = 0.7;

// ---------------------------------------------------------------------------
// Provider contract
// ---------------------------------------------------------------------------

/// A failed generation or validation call against a vendor API.
#[derive(Debug, Clone, Error)]
#[error("{vendor} API error: {cause}")]
pub(crate) struct ProviderError {
    pub vendor: String,
    pub cause: String,
}

impl ProviderError {
    pub fn new(vendor: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            vendor: vendor.into(),
            cause: cause.into(),
        }
    }
}

/// Per-call generation options.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GenerateOptions {
    pub max_tokens: u32,
    /// `None` leaves the choice to the provider (OpenAI-style vendors use 0.7).
    pub temperature: Option<f32>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: None,
        }
    }
}

/// Generates chat completions from one vendor for one model.
#[async_trait]
pub(crate) trait Provider: Send + Sync {
    /// Send the full context and return the complete response text.
    async fn generate_response(
        &self,
        context: &[ContextMessage],
        options: &GenerateOptions,
    ) -> Result<String, ProviderError>;

    /// Check the configured model with a minimal request. Never errors.
    async fn validate_model(&self) -> bool;

    /// Constant identifier, e.g. `"openai"`.
    fn provider_name(&self) -> &'static str;

    fn model_name(&self) -> &str;

    /// Generate from a bare string, treated as a single user turn.
    async fn generate_from_text(
        &self,
        text: &str,
        options: &GenerateOptions,
    ) -> Result<String, ProviderError> {
        self.generate_response(&[ContextMessage::user(text)], options)
            .await
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Everything a vendor constructor needs.
#[derive(Debug, Clone)]
pub(crate) struct ProviderSettings {
    pub api_key: String,
    pub model_name: String,
    pub base_url: Option<String>,
    pub timeout: Duration,
}

pub(crate) type ProviderConstructor =
    Arc<dyn Fn(ProviderSettings) -> Result<Arc<dyn Provider>, ProviderError> + Send + Sync>;

/// Maps provider identifiers to constructors.
///
/// Construction only: models are validated by the caller.
#[derive(Clone)]
pub(crate) struct ProviderFactory {
    constructors: HashMap<String, ProviderConstructor>,
    base_urls: HashMap<String, String>,
    timeout: Duration,
}

impl ProviderFactory {
    /// An empty factory with no registered vendors.
    pub fn new(timeout: Duration, base_urls: HashMap<String, String>) -> Self {
        Self {
            constructors: HashMap::new(),
            base_urls,
            timeout,
        }
    }

    /// A factory with the built-in vendors registered.
    pub fn with_defaults(timeout: Duration, base_urls: HashMap<String, String>) -> Self {
        let mut factory = Self::new(timeout, base_urls);
        factory.register(openai::PROVIDER_NAME, Arc::new(openai::construct));
        factory.register(anthropic::PROVIDER_NAME, Arc::new(anthropic::construct));
        factory.register(deepseek::PROVIDER_NAME, Arc::new(deepseek::construct));
        factory
    }

    /// Add or replace a vendor constructor.
    pub fn register(&mut self, provider_id: &str, constructor: ProviderConstructor) {
        self.constructors.insert(provider_id.to_string(), constructor);
    }

    /// Build a provider for `provider_id`. No network I/O happens here.
    pub fn create(
        &self,
        provider_id: &str,
        api_key: &str,
        model_name: &str,
    ) -> Result<Arc<dyn Provider>, GatewayError> {
        let constructor = self
            .constructors
            .get(provider_id)
            .ok_or_else(|| GatewayError::UnsupportedProvider(provider_id.to_string()))?;

        let settings = ProviderSettings {
            api_key: api_key.to_string(),
            model_name: model_name.to_string(),
            base_url: self.base_urls.get(provider_id).cloned(),
            timeout: self.timeout,
        };

        tracing::debug!(provider = %provider_id, model = %model_name, "creating provider");
        Ok(constructor(settings)?)
    }

    /// Registered provider identifiers, sorted.
    pub fn supported_providers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.constructors.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factory() -> ProviderFactory {
        ProviderFactory::with_defaults(Duration::from_secs(5), HashMap::new())
    }

    #[test]
    fn test_create_known_providers_report_their_id() {
        let factory = factory();
        for id in factory.supported_providers() {
            let provider = factory.create(&id, "key", "some-model").unwrap();
            assert_eq!(provider.provider_name(), id);
            assert_eq!(provider.model_name(), "some-model");
        }
    }

    #[test]
    fn test_supported_providers_sorted() {
        assert_eq!(
            factory().supported_providers(),
            vec!["claude", "deepseek", "openai"]
        );
    }

    #[test]
    fn test_create_unknown_provider_fails() {
        for id in ["bogus", "", "OpenAI", "anthropic"] {
            match factory().create(id, "key", "model") {
                Err(GatewayError::UnsupportedProvider(got)) => assert_eq!(got, id),
                Err(other) => panic!("unexpected error: {other}"),
                Ok(_) => panic!("expected UnsupportedProvider for {id:?}"),
            }
        }
    }

    #[test]
    fn test_register_extends_factory() {
        let mut factory = factory();
        mock::register(&mut factory, mock::MockProvider::new("m"));
        let provider = factory.create("mock", "key", "m1").unwrap();
        assert_eq!(provider.provider_name(), "mock");
        assert_eq!(provider.model_name(), "m1");
        assert!(factory.supported_providers().contains(&"mock".to_string()));
    }

    #[test]
    fn test_base_url_override_passed_to_constructor() {
        let mut base_urls = HashMap::new();
        base_urls.insert("mock".to_string(), "http://localhost:9999".to_string());
        let mut factory = ProviderFactory::new(Duration::from_secs(1), base_urls);
        let seen = Arc::new(std::sync::Mutex::new(None));
        let seen2 = seen.clone();
        factory.register(
            "mock",
            Arc::new(
                move |s: ProviderSettings| -> Result<Arc<dyn Provider>, ProviderError> {
                    *seen2.lock().unwrap() = s.base_url.clone();
                    Ok(Arc::new(mock::MockProvider::new(&s.model_name)) as Arc<dyn Provider>)
                },
            ),
        );
        factory.create("mock", "key", "m").unwrap();
        assert_eq!(
            seen.lock().unwrap().as_deref(),
            Some("http://localhost:9999")
        );
    }

    #[tokio::test]
    async fn test_generate_from_text_is_single_user_turn() {
        let provider = mock::MockProvider::new("m").with_responses(vec![Ok("ok".into())]);
        let out = provider
            .generate_from_text("hello", &GenerateOptions::default())
            .await
            .unwrap();
        assert_eq!(out, "ok");
        let calls = provider.recorded_contexts();
        assert_eq!(calls, vec![vec![ContextMessage::user("hello")]]);
    }

    #[test]
    fn test_default_options() {
        let opts = GenerateOptions::default();
        assert_eq!(opts.max_tokens, 1000);
        assert!(opts.temperature.is_none());
    }
}
