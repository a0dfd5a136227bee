use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use super::sse::{ensure_success, fragment_stream};
use super::{
    AuthRequest, AuthResponse, Authorizer, ChatRequest, ChatTransport, FragmentStream,
    ProxyEvent, ACCESS_KEY_HEADER,
};
use crate::error::TransportError;
use crate::state::Message;

/// Streams completions through the streamchat server's `/api/chat` route.
#[derive(Clone)]
pub struct ProxyTransport {
    client: Client,
    server_url: String,
}

impl ProxyTransport {
    pub fn new(server_url: &str) -> Self {
        Self {
            client: Client::new(),
            server_url: server_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ChatTransport for ProxyTransport {
    async fn stream(
        &self,
        history: &[Message],
        credential: &str,
    ) -> Result<FragmentStream, TransportError> {
        let url = format!("{}/api/chat", self.server_url);

        let response = self
            .client
            .post(&url)
            .header(ACCESS_KEY_HEADER, credential)
            .json(&ChatRequest::from_history(history))
            .send()
            .await?;

        let response = ensure_success(response, "streamchat server").await?;
        Ok(fragment_stream(response, parse_event))
    }
}

fn parse_event(data: &str) -> Option<Result<String, TransportError>> {
    match serde_json::from_str::<ProxyEvent>(data) {
        Ok(ProxyEvent::Delta(text)) if text.is_empty() => None,
        Ok(ProxyEvent::Delta(text)) => Some(Ok(text)),
        Ok(ProxyEvent::Error(message)) => Some(Err(TransportError::Stream(message))),
        Err(e) => {
            debug!(error = %e, data, "skipping unparseable proxy event");
            None
        }
    }
}

/// Upper bound on one `/api/auth` round trip
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Asks the server whether an access key is valid before sending.
#[derive(Clone)]
pub struct ProxyAuthorizer {
    client: Client,
    server_url: String,
}

impl ProxyAuthorizer {
    pub fn new(server_url: &str) -> Self {
        Self::with_timeout(server_url, AUTH_TIMEOUT)
    }

    /// A server that accepts but never answers counts as a refusal after
    /// `timeout`.
    pub fn with_timeout(server_url: &str, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .connect_timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            server_url: server_url.trim_end_matches('/').to_string(),
        }
    }

    async fn check(&self, credential: &str) -> Result<bool, TransportError> {
        let url = format!("{}/api/auth", self.server_url);
        let response = self
            .client
            .post(&url)
            .json(&AuthRequest {
                access_key: credential.to_string(),
            })
            .send()
            .await?;

        let response = ensure_success(response, "streamchat server").await?;
        let auth: AuthResponse = response.json().await?;
        Ok(auth.ok)
    }
}

#[async_trait]
impl Authorizer for ProxyAuthorizer {
    async fn authorize(&self, credential: &str) -> bool {
        match self.check(credential).await {
            Ok(ok) => ok,
            Err(e) => {
                warn!(error = %e, "auth check failed");
                false
            }
        }
    }
}
