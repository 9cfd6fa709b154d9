pub(crate) mod schema;

pub(crate) use schema::Config;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Load configuration, checking (in order):
/// 1. `explicit` (`--config` or `$CHAT_GATEWAY_CONFIG`), which must exist
/// 2. `~/.chat-gateway/config.yaml`
/// 3. Built-in defaults
pub(crate) fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let config = match explicit {
        Some(p) => load_from(p)?,
        None => match default_config_path() {
            Some(p) if p.exists() => load_from(&p)?,
            _ => {
                tracing::debug!("no config file found, using defaults");
                Config::default()
            }
        },
    };
    config.validate()?;
    Ok(config)
}

fn load_from(path: &Path) -> Result<Config> {
    tracing::info!(path = %path.display(), "loading config");
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    let mut cfg: Config = serde_yaml::from_str(&raw)
        .with_context(|| format!("parsing config from {}", path.display()))?;
    resolve_env_vars(&mut cfg);
    Ok(cfg)
}

fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".chat-gateway").join("config.yaml"))
}

/// Resolve the data directory, defaulting to `~/.chat-gateway/`.
pub(crate) fn resolve_data_dir(config: &Config) -> Result<PathBuf> {
    if let Some(ref dir) = config.data_dir {
        return Ok(dir.clone());
    }
    let home = dirs::home_dir().context("could not determine home directory")?;
    Ok(home.join(".chat-gateway"))
}

/// Resolve `${ENV_VAR}` references in base URL overrides.
fn resolve_env_vars(config: &mut Config) {
    for url in config.base_urls.values_mut() {
        *url = substitute_env_vars(url);
    }
}

/// Substitute `${VAR}` patterns with environment variable values.
/// Unset variables are replaced with the empty string.
pub(crate) fn substitute_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        let Some(end) = rest[start + 2..].find('}') else {
            break;
        };
        result.push_str(&rest[..start]);
        let var_name = &rest[start + 2..start + 2 + end];
        result.push_str(&std::env::var(var_name).unwrap_or_default());
        rest = &rest[start + 2 + end + 1..];
    }
    result.push_str(rest);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.data_dir.is_none());
        assert_eq!(config.agent_type, "chat");
        assert_eq!(config.max_tokens, 1000);
        assert!(config.temperature.is_none());
        assert_eq!(config.request_timeout_secs, 120);
        assert_eq!(config.stream_delay_ms, 30);
        assert!(config.system_prompt.starts_with("You are a helpful AI assistant."));
    }

    #[test]
    fn test_validate_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_temperature_out_of_range() {
        let mut config = Config::default();
        config.temperature = Some(3.0);
        assert!(config.validate().is_err());

        config.temperature = Some(-1.0);
        assert!(config.validate().is_err());

        config.temperature = Some(1.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_values() {
        let mut config = Config::default();
        config.max_tokens = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.request_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_empty_system_prompt() {
        let mut config = Config::default();
        config.system_prompt = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_substitute_env_vars_passthrough() {
        assert_eq!(substitute_env_vars("http://localhost:8080"), "http://localhost:8080");
    }

    #[test]
    fn test_substitute_env_vars_with_home() {
        // HOME is always set in test environment
        let result = substitute_env_vars("${HOME}/x");
        assert!(result.ends_with("/x"));
        assert!(!result.contains("${"));
    }

    #[test]
    fn test_substitute_env_vars_unterminated() {
        assert_eq!(substitute_env_vars("abc${HOME"), "abc${HOME");
    }

    #[test]
    fn test_parse_yaml_config() {
        let yaml = r#"
data_dir: /tmp/gateway
max_tokens: 2048
temperature: 0.3
stream_delay_ms: 0
agent_type: basic
base_urls:
  openai: http://localhost:8000/v1
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/gateway")));
        assert_eq!(config.max_tokens, 2048);
        assert_eq!(config.temperature, Some(0.3));
        assert_eq!(config.stream_delay_ms, 0);
        assert_eq!(config.agent_type, "basic");
        assert_eq!(config.base_urls["openai"], "http://localhost:8000/v1");
        assert_eq!(config.request_timeout_secs, 120);
    }

    #[test]
    fn test_parse_empty_yaml() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.max_tokens, 1000);
        assert_eq!(config.stream_delay_ms, 30);
    }

    #[test]
    fn test_load_from_file_resolves_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "base_urls:\n  claude: \"${HOME}/proxy\"\n").unwrap();

        let config = load_from(&path).unwrap();
        assert!(!config.base_urls["claude"].contains("${"));
    }

    #[test]
    fn test_load_config_explicit_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("absent.yaml"))).is_err());
    }

    #[test]
    fn test_load_config_explicit_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "max_tokens: 0\n").unwrap();
        assert!(load_config(Some(&path)).is_err());
    }

    #[test]
    fn test_resolve_data_dir_override() {
        let config = Config {
            data_dir: Some(PathBuf::from("/srv/gw")),
            ..Config::default()
        };
        assert_eq!(resolve_data_dir(&config).unwrap(), PathBuf::from("/srv/gw"));
    }
}
