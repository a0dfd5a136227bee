use serde::{Deserialize, Serialize};

use crate::store;

/// How the client reaches the model, which also fixes its trust model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Through the streamchat server, gated by a shared access key
    #[default]
    Proxy,
    /// Straight to the provider with the user's own API key
    Direct,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Proxy => "proxy",
            Mode::Direct => "direct",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "proxy" => Some(Mode::Proxy),
            "direct" => Some(Mode::Direct),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Mode::Proxy => "Server proxy",
            Mode::Direct => "Direct (OpenAI)",
        }
    }

    /// Storage key of the credential this mode sends
    pub fn credential_key(&self) -> &'static str {
        match self {
            Mode::Proxy => store::ACCESS_KEY,
            Mode::Direct => store::API_KEY,
        }
    }

    /// Label of the credential in the settings popup
    pub fn credential_label(&self) -> &'static str {
        match self {
            Mode::Proxy => "Access Key",
            Mode::Direct => "OpenAI API Key",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str_is_case_insensitive() {
        assert_eq!(Mode::from_str("Direct"), Some(Mode::Direct));
        assert_eq!(Mode::from_str("PROXY"), Some(Mode::Proxy));
        assert_eq!(Mode::from_str("ollama"), None);
    }

    #[test]
    fn test_modes_use_separate_credentials() {
        assert_ne!(Mode::Proxy.credential_key(), Mode::Direct.credential_key());
    }
}
