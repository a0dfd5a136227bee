//! Server configuration, loaded from environment variables at startup.

use streamchat_core::auth::AuthConfig;
use streamchat_core::config::{DEFAULT_API_BASE, DEFAULT_MODEL};
use streamchat_core::ConfigError;

const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Runtime configuration for streamchat-server.
///
/// The shared secret and the provider key have no defaults: the server
/// refuses to start without them.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub auth: AuthConfig,

    /// Provider key used for every proxied completion.
    pub openai_api_key: String,

    /// Chat model requested from the provider (default: `"gpt-4o"`).
    pub model: String,

    /// Base URL of the OpenAI-compatible API.
    pub api_base: String,

    /// TCP address to bind (default: `"127.0.0.1:3000"`).
    pub bind_address: String,

    /// `tracing` filter string, e.g. `"info"` or `"debug,hyper=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let auth = AuthConfig::from_lookup(&lookup)?;
        let openai_api_key = lookup(OPENAI_API_KEY_ENV)
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::Missing(OPENAI_API_KEY_ENV))?;

        let env_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_owned());

        Ok(Self {
            auth,
            openai_api_key,
            model: env_or("STREAMCHAT_MODEL", DEFAULT_MODEL),
            api_base: env_or("STREAMCHAT_API_BASE", DEFAULT_API_BASE),
            bind_address: env_or("STREAMCHAT_BIND", "127.0.0.1:3000"),
            log_level: env_or("STREAMCHAT_LOG", "info"),
            log_json: lookup("STREAMCHAT_LOG_JSON")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_with_required_keys() {
        let config =
            ServerConfig::from_lookup(lookup(&[("ACCESS_KEY", "secret"), ("OPENAI_API_KEY", "sk-1")]))
                .unwrap();

        assert_eq!(config.openai_api_key, "sk-1");
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(config.bind_address, "127.0.0.1:3000");
        assert_eq!(config.log_level, "info");
        assert!(!config.log_json);
    }

    #[test]
    fn test_missing_access_key_is_fatal() {
        let err = ServerConfig::from_lookup(lookup(&[("OPENAI_API_KEY", "sk-1")])).unwrap_err();
        assert_eq!(err.to_string(), "ACCESS_KEY is not set.");
    }

    #[test]
    fn test_missing_provider_key_is_fatal() {
        let err = ServerConfig::from_lookup(lookup(&[("ACCESS_KEY", "secret"), ("OPENAI_API_KEY", "")]))
            .unwrap_err();
        assert_eq!(err.to_string(), "OPENAI_API_KEY is not set.");
    }

    #[test]
    fn test_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("ACCESS_KEY", "secret"),
            ("OPENAI_API_KEY", "sk-1"),
            ("STREAMCHAT_MODEL", "gpt-4o-mini"),
            ("STREAMCHAT_BIND", "0.0.0.0:8080"),
            ("STREAMCHAT_LOG_JSON", "TRUE"),
        ]))
        .unwrap();

        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.bind_address, "0.0.0.0:8080");
        assert!(config.log_json);
    }
}
