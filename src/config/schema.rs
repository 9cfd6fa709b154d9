use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::agent::DEFAULT_SYSTEM_PROMPT;
use crate::llm::{GenerateOptions, DEFAULT_MAX_TOKENS};

/// Top-level gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Config {
    /// Directory holding `api_keys.json` and `chat_sessions.json`.
    /// Defaults to `~/.chat-gateway/`.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// System prompt given to every agent.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Agent type passed to the agent factory: "chat" or "basic".
    #[serde(default = "default_agent_type")]
    pub agent_type: String,

    /// Max tokens for LLM responses.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Temperature for LLM responses. Unset means the vendor default.
    #[serde(default)]
    pub temperature: Option<f32>,

    /// Per-call timeout for provider HTTP requests.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Delay between streamed characters.
    #[serde(default = "default_stream_delay_ms")]
    pub stream_delay_ms: u64,

    /// Base URL overrides keyed by provider id, supports `${ENV_VAR}` syntax.
    #[serde(default)]
    pub base_urls: HashMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            system_prompt: default_system_prompt(),
            agent_type: default_agent_type(),
            max_tokens: default_max_tokens(),
            temperature: None,
            request_timeout_secs: default_request_timeout_secs(),
            stream_delay_ms: default_stream_delay_ms(),
            base_urls: HashMap::new(),
        }
    }
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_agent_type() -> String {
    "chat".to_string()
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_stream_delay_ms() -> u64 {
    30
}

impl Config {
    /// Validate configuration values, returning an error with a helpful message
    /// if any value is out of range.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.system_prompt.trim().is_empty() {
            anyhow::bail!("system_prompt cannot be empty");
        }
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                anyhow::bail!("temperature must be between 0.0 and 2.0, got {t}");
            }
        }
        if self.max_tokens == 0 {
            anyhow::bail!("max_tokens must be greater than 0");
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be greater than 0");
        }
        Ok(())
    }

    pub fn generate_options(&self) -> GenerateOptions {
        GenerateOptions {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn stream_delay(&self) -> Duration {
        Duration::from_millis(self.stream_delay_ms)
    }
}
