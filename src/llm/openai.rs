// OpenAI Chat Completions API provider.
//
// POST {base}/chat/completions, non-streaming. The same wire shape is reused
// by OpenAI-compatible vendors (see deepseek.rs) through `ChatCompletions`.
// System turns are sent as-is: the API accepts them in the message list.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::http::{build_client, post_json, resolve_base_url};
use super::{GenerateOptions, Provider, ProviderError, ProviderSettings, DEFAULT_TEMPERATURE};
use crate::agent::types::ContextMessage;

pub(crate) const PROVIDER_NAME: &str = "openai";
const VENDOR: &str = "OpenAI";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// A Chat Completions endpoint bound to one key and model.
pub(crate) struct ChatCompletions {
    vendor: &'static str,
    client: reqwest::Client,
    api_key: String,
    model_name: String,
    base_url: String,
}

impl ChatCompletions {
    pub fn new(
        vendor: &'static str,
        default_base_url: &str,
        settings: ProviderSettings,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            vendor,
            client: build_client(vendor, settings.timeout)?,
            base_url: resolve_base_url(settings.base_url.as_deref(), default_base_url),
            api_key: settings.api_key,
            model_name: settings.model_name,
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn post(&self, body: &Value) -> Result<Value, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut request = self.client.post(&url);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }
        post_json(self.vendor, request, body).await
    }

    pub async fn generate(
        &self,
        context: &[ContextMessage],
        options: &GenerateOptions,
    ) -> Result<String, ProviderError> {
        let body = build_request_body(&self.model_name, context, options);
        let response = self.post(&body).await?;
        extract_text(&response).ok_or_else(|| {
            ProviderError::new(self.vendor, "response contained no message content")
        })
    }

    /// One-token validation request; failures are logged and reported as `false`.
    pub async fn check_model(&self) -> bool {
        let body = json!({
            "model": self.model_name,
            "messages": [{ "role": "user", "content": "test" }],
            "max_tokens": 1,
        });
        // Any 2xx is enough: a 1-token completion may carry no text.
        match self.post(&body).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(model = %self.model_name, error = %e, "model validation failed");
                false
            }
        }
    }
}

/// Build the request body for the Chat Completions API.
pub(crate) fn build_request_body(
    model: &str,
    context: &[ContextMessage],
    options: &GenerateOptions,
) -> Value {
    let messages: Vec<Value> = context
        .iter()
        .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
        .collect();

    json!({
        "model": model,
        "messages": messages,
        "max_tokens": options.max_tokens,
        "temperature": options.temperature.unwrap_or(DEFAULT_TEMPERATURE),
    })
}

/// `choices[0].message.content`, if it is a string.
pub(crate) fn extract_text(response: &Value) -> Option<String> {
    response["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

pub(crate) struct OpenAiProvider {
    inner: ChatCompletions,
}

impl OpenAiProvider {
    pub fn new(settings: ProviderSettings) -> Result<Self, ProviderError> {
        Ok(Self {
            inner: ChatCompletions::new(VENDOR, DEFAULT_BASE_URL, settings)?,
        })
    }
}

pub(crate) fn construct(settings: ProviderSettings) -> Result<Arc<dyn Provider>, ProviderError> {
    Ok(Arc::new(OpenAiProvider::new(settings)?))
}

#[async_trait]
impl Provider for OpenAiProvider {
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
