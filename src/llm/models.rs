// Well-known model identifiers per provider.
//
// Only used for hints in the CLI; any model the vendor accepts can be
// configured, the validation request is the source of truth.

/// Suggested model identifiers for a provider, most capable first.
pub(crate) fn suggested_models(provider_id: &str) -> &'static [&'static str] {
    match provider_id {
        "openai" => &["gpt-4o", "gpt-4o-mini", "gpt-4-turbo", "gpt-4"],
        "claude" => &[
            "claude-sonnet-4-20250514",
            "claude-3-5-haiku-20241022",
            "claude-3-haiku-20240307",
        ],
        "deepseek" => &["deepseek-chat", "deepseek-reasoner"],
        _ => &[],
    }
}

/// Environment variable conventionally holding the provider's API key.
pub(crate) fn api_key_env_var(provider_id: &str) -> Option<&'static str> {
    match provider_id {
        "openai" => Some("OPENAI_API_KEY"),
        "claude" => Some("ANTHROPIC_API_KEY"),
        "deepseek" => Some("DEEPSEEK_API_KEY"),
        _ => None,
    }
}
