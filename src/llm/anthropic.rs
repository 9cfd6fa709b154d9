// Anthropic Messages API provider, registered as "claude".
//
// POST /v1/messages, non-streaming. The Messages API rejects system-role
// entries in `messages`, so system turns are folded into the top-level
// `system` field before dispatch.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::http::{build_client, post_json, resolve_base_url};
use super::{GenerateOptions, Provider, ProviderError, ProviderSettings};
use crate::agent::types::{ContextMessage, Role};

pub(crate) const PROVIDER_NAME: &str = "claude";
const VENDOR: &str = "Claude";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub(crate) struct ClaudeProvider {
    client: reqwest::Client,
    api_key: String,
    model_name: String,
    base_url: String,
}

impl ClaudeProvider {
    pub fn new(settings: ProviderSettings) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(VENDOR, settings.timeout)?,
            base_url: resolve_base_url(settings.base_url.as_deref(), DEFAULT_BASE_URL),
            api_key: settings.api_key,
            model_name: settings.model_name,
        })
    }

    async fn post(&self, body: &Value) -> Result<Value, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);
        let request = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION);
        post_json(VENDOR, request, body).await
    }
}

pub(crate) fn construct(settings: ProviderSettings) -> Result<Arc<dyn Provider>, ProviderError> {
    Ok(Arc::new(ClaudeProvider::new(settings)?))
}

/// Build the request body for the Messages API.
///
/// Fails when the context has no user or assistant turn left after the
/// system turns are folded out.
fn build_request_body(
    model: &str,
    context: &[ContextMessage],
    options: &GenerateOptions,
) -> Result<Value, ProviderError> {
    let mut system_parts: Vec<&str> = Vec::new();
    let mut messages: Vec<Value> = Vec::new();

    for msg in context {
        match msg.role {
            Role::System => system_parts.push(&msg.content),
            Role::User | Role::Assistant => messages.push(json!({
                "role": msg.role.as_str(),
                "content": msg.content,
            })),
        }
    }

    if messages.is_empty() {
        return Err(ProviderError::new(
            VENDOR,
            "context has no user or assistant messages",
        ));
    }

    let mut body = json!({
        "model": model,
        "max_tokens": options.max_tokens,
        "messages": messages,
    });

    if !system_parts.is_empty() {
        body["system"] = json!(system_parts.join("\n\n"));
    }
    if let Some(temp) = options.temperature {
        body["temperature"] = json!(temp);
    }

    Ok(body)
}

/// Concatenate the `text` blocks of a Messages API response.
///
/// `None` when there is no text block at all; empty text is a valid reply.
fn extract_text(response: &Value) -> Option<String> {
    let blocks = response["content"].as_array()?;
    let mut texts = blocks
        .iter()
        .filter(|b| b["type"] == "text")
        .filter_map(|b| b["text"].as_str())
        .peekable();
    texts.peek()?;
    Some(texts.collect())
}

#[async_trait]
impl Provider for ClaudeProvider {
    async fn generate_response(
        &self,
        context: &[ContextMessage],
        options: &GenerateOptions,
    ) -> Result<String, ProviderError> {
        let body = build_request_body(&self.model_name, context, options)?;
        let response = self.post(&body).await?;
        extract_text(&response)
            .ok_or_else(|| ProviderError::new(VENDOR, "response contained no text content"))
    }

    async fn validate_model(&self) -> bool {
        let body = json!({
            "model": self.model_name,
            "max_tokens": 1,
            "messages": [{ "role": "user", "content": "test" }],
        });
        match self.post(&body).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(model = %self.model_name, error = %e, "model validation failed");
                false
            }
        }
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
