//! Shared-secret auth gate used by the proxy server.

use crate::error::ConfigError;

/// Environment variable holding the shared secret
pub const ACCESS_KEY_ENV: &str = "ACCESS_KEY";

#[derive(Debug, Clone)]
pub struct AuthConfig {
    access_key: String,
}

impl AuthConfig {
    pub fn new(access_key: impl Into<String>) -> Result<Self, ConfigError> {
        let access_key = access_key.into();
        if access_key.is_empty() {
            return Err(ConfigError::Missing(ACCESS_KEY_ENV));
        }
        Ok(Self { access_key })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup (the process environment in
    /// production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let access_key = lookup(ACCESS_KEY_ENV).ok_or(ConfigError::Missing(ACCESS_KEY_ENV))?;
        Self::new(access_key)
    }
}

#[derive(Debug, Clone)]
pub struct AuthGate {
    config: AuthConfig,
}

impl AuthGate {
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// True iff `candidate` is exactly the configured secret.
    pub fn check(&self, candidate: &str) -> bool {
        candidate == self.config.access_key
    }
}
