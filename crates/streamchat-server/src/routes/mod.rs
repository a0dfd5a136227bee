//! Axum router construction.
//!
//! - `GET /healthz`
//! - `POST /api/auth` checks an access key
//! - `POST /api/chat` streams a completion as server-sent events

mod auth;
mod chat;
mod health;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

pub fn build(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(health::router())
        .merge(auth::router())
        .merge(chat::router())
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use futures_util::stream::{self, StreamExt};
    use http_body_util::BodyExt;
    use streamchat_core::{
        AuthConfig, AuthGate, ChatTransport, FragmentStream, Message, TransportError,
    };

    use crate::state::AppState;

    pub const SECRET: &str = "secret";
    pub const PROVIDER_KEY: &str = "sk-test";

    /// Transport that replays fixed fragments and records what it was sent.
    #[derive(Default)]
    pub struct Scripted {
        fragments: Vec<Result<String, String>>,
        calls: AtomicUsize,
        seen: Mutex<Vec<(Vec<String>, String)>>,
    }

    impl Scripted {
        pub fn new(fragments: Vec<Result<&str, &str>>) -> Self {
            Self {
                fragments: fragments
                    .into_iter()
                    .map(|f| f.map(str::to_string).map_err(str::to_string))
                    .collect(),
                ..Default::default()
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        /// Contents of each request's history, with the credential used.
        pub fn seen(&self) -> Vec<(Vec<String>, String)> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatTransport for Scripted {
        async fn stream(
            &self,
            history: &[Message],
            credential: &str,
        ) -> Result<FragmentStream, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push((
                history.iter().map(|m| m.content.clone()).collect(),
                credential.to_string(),
            ));
            let items: Vec<Result<String, TransportError>> = self
                .fragments
                .iter()
                .cloned()
                .map(|f| f.map_err(TransportError::Stream))
                .collect();
            Ok(stream::iter(items).boxed())
        }
    }

    pub fn state(transport: Arc<dyn ChatTransport>) -> Arc<AppState> {
        Arc::new(AppState {
            gate: AuthGate::new(AuthConfig::new(SECRET).unwrap()),
            transport,
            api_key: PROVIDER_KEY.to_string(),
        })
    }

    pub fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    pub async fn body_text(response: axum::response::Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }
}
