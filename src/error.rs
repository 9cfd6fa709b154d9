use thiserror::Error;

use crate::llm::ProviderError;

/// Errors surfaced by the gateway core to its callers.
///
/// Generation failures are not in here: the agent records them as an
/// assistant turn instead of failing the request.
#[derive(Debug, Error)]
pub(crate) enum GatewayError {
    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    #[error("Model '{model_name}' not found for provider '{provider_id}'. Please check the model name.")]
    ModelNotFound {
        model_name: String,
        provider_id: String,
    },

    #[error("No API key configured for {0}")]
    ProviderNotConfigured(String),

    #[error("Model \"{model_name}\" not configured for provider \"{provider_id}\"")]
    ModelNotConfigured {
        model_name: String,
        provider_id: String,
    },

    #[error("Chat session not found: {0}")]
    SessionNotFound(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("storage error: {0:#}")]
    Store(#[from] anyhow::Error),
}
