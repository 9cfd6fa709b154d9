// Shared HTTP plumbing for the vendor providers.
//
// Every provider makes exactly one POST per call and reads a JSON body back.
// Failures at any stage (connect, status, decode) become a ProviderError
// tagged with the vendor label; nothing is retried.

use std::time::Duration;

use serde_json::Value;

use super::ProviderError;

/// Build a client with the configured per-call timeout.
pub(crate) fn build_client(vendor: &str, timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::new(vendor, format!("failed to build HTTP client: {e}")))
}

/// Resolve a configured base URL, falling back to the vendor default.
pub(crate) fn resolve_base_url(configured: Option<&str>, default: &str) -> String {
    match configured {
        Some(url) if !url.trim().is_empty() => url.trim().trim_end_matches('/').to_string(),
        _ => default.to_string(),
    }
}

/// POST a JSON body and return the decoded JSON response.
pub(crate) async fn post_json(
    vendor: &str,
    request: reqwest::RequestBuilder,
    body: &Value,
) -> Result<Value, ProviderError> {
    let response = request
        .header("content-type", "application/json")
        .json(body)
        .send()
        .await
        .map_err(|e| ProviderError::new(vendor, format!("request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(ProviderError::new(
            vendor,
            format!("({}): {}", status.as_u16(), summarize_error_body(&text)),
        ));
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| ProviderError::new(vendor, format!("invalid response body: {e}")))
}

/// Pull `error.message` out of a vendor error payload when present.
fn summarize_error_body(text: &str) -> String {
    serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| text.trim().to_string())
}
