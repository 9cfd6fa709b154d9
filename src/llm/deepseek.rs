// DeepSeek provider.
//
// DeepSeek serves the OpenAI Chat Completions wire format, so this is a thin
// binding of `ChatCompletions` to DeepSeek's endpoint and label.

use std::sync::Arc;

use async_trait::async_trait;

use super::openai::ChatCompletions;
use super::{GenerateOptions, Provider, ProviderError, ProviderSettings};
use crate::agent::types::ContextMessage;

pub(crate) const PROVIDER_NAME: &str = "deepseek";
const VENDOR: &str = "DeepSeek";
const DEFAULT_BASE_URL: &str = "https://api.deepseek.com/v1";

pub(crate) struct DeepSeekProvider {
    inner: ChatCompletions,
}

impl DeepSeekProvider {
    pub fn new(settings: ProviderSettings) -> Result<Self, ProviderError> {
        Ok(Self {
            inner: ChatCompletions::new(VENDOR, DEFAULT_BASE_URL, settings)?,
        })
    }
}

pub(crate) fn construct(settings: ProviderSettings) -> Result<Arc<dyn Provider>, ProviderError> {
    Ok(Arc::new(DeepSeekProvider::new(settings)?))
}

#[async_trait]
impl Provider for DeepSeekProvider {
    async fn generate_response(
        &self,
        context: &[ContextMessage],
        options: &GenerateOptions,
    ) -> Result<String, ProviderError> {
        self.inner.generate(context, options).await
    }

    async fn validate_model(&self) -> bool {
        self.inner.check_model().await
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}
