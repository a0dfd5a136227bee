//! Streaming transports.
//!
//! A transport turns the conversation so far into a finite stream of text
//! fragments. The controller does not know which backing it talks to.

pub mod openai;
pub mod proxy;
mod sse;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::TransportError;
use crate::state::{Message, MessageId, Role};

pub use openai::OpenAiTransport;
pub use proxy::{ProxyAuthorizer, ProxyTransport};

/// Header carrying the shared access key to the proxy server
pub const ACCESS_KEY_HEADER: &str = "x-access-key";

/// Incremental text fragments of one completion, in arrival order
pub type FragmentStream = BoxStream<'static, Result<String, TransportError>>;

#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Start a completion for `history`, authenticated with `credential`.
    async fn stream(
        &self,
        history: &[Message],
        credential: &str,
    ) -> Result<FragmentStream, TransportError>;
}

/// Pre-send credential check
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(&self, credential: &str) -> bool;
}

/// Accepts every credential; used when the credential goes straight to the
/// provider and there is no server to ask.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl Authorizer for AllowAll {
    async fn authorize(&self, _credential: &str) -> bool {
        true
    }
}

/// A message as it travels over the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: Role,
    pub content: String,
}

impl From<&Message> for WireMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
        }
    }
}

/// Incoming wire messages get fresh ids; ids never cross the wire.
impl From<WireMessage> for Message {
    fn from(message: WireMessage) -> Self {
        Self {
            id: MessageId::new(),
            role: message.role,
            content: message.content,
        }
    }
}

/// Body of `POST /api/chat`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<WireMessage>,
}

impl ChatRequest {
    pub fn from_history(history: &[Message]) -> Self {
        Self {
            messages: history.iter().map(WireMessage::from).collect(),
        }
    }
}

/// Body of `POST /api/auth`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRequest {
    pub access_key: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AuthResponse {
    pub ok: bool,
}

/// One server-sent event of the proxy stream: `{"delta": ".."}` or
/// `{"error": ".."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyEvent {
    Delta(String),
    Error(String),
}

/// Data of the final server-sent event
pub const DONE_SENTINEL: &str = "[DONE]";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_event_wire_shape() {
        let delta = serde_json::to_string(&ProxyEvent::Delta("Hel".into())).unwrap();
        assert_eq!(delta, r#"{"delta":"Hel"}"#);

        let error: ProxyEvent = serde_json::from_str(r#"{"error":"boom"}"#).unwrap();
        assert_eq!(error, ProxyEvent::Error("boom".into()));
    }

    #[test]
    fn test_chat_request_keeps_history_order() {
        let history = vec![Message::user("one"), Message::user("two")];
        let request = ChatRequest::from_history(&history);
        let contents: Vec<&str> = request.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two"]);

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[tokio::test]
    async fn test_allow_all_accepts_anything() {
        assert!(AllowAll.authorize("").await);
        assert!(AllowAll.authorize("anything").await);
    }
}
