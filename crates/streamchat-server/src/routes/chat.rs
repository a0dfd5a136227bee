//! Streaming chat proxy.
//!
//! The client sends its history with the shared access key in a header; the
//! server forwards it to the provider with its own key and relays each
//! fragment as a `{"delta": ..}` event. A mid-stream failure is logged and
//! becomes a single generic `{"error": ..}` event. Every stream ends with
//! `[DONE]`.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures_util::{future, stream, StreamExt};
use streamchat_core::transport::{ChatRequest, ProxyEvent, ACCESS_KEY_HEADER, DONE_SENTINEL};
use streamchat_core::Message;
use tracing::{debug, error, info};

use crate::error::ServerError;
use crate::state::AppState;

/// Sent in place of the upstream error text, which can carry provider URLs.
pub const STREAM_FAILED: &str = "upstream stream failed";

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/api/chat", post(chat))
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Result<Response, ServerError> {
    let access_key = headers
        .get(ACCESS_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !state.gate.check(access_key) {
        info!("chat request refused: bad access key");
        return Err(ServerError::Unauthorized);
    }

    if req.messages.is_empty() {
        return Err(ServerError::BadRequest("no messages".into()));
    }

    let history: Vec<Message> = req.messages.into_iter().map(Message::from).collect();
    debug!(turns = history.len(), "proxying chat completion");

    let fragments = state.transport.stream(&history, &state.api_key).await?;

    let events = fragments
        .map(|fragment| match fragment {
            Ok(text) => ProxyEvent::Delta(text),
            Err(e) => {
                error!(error = %e, "upstream stream failed");
                ProxyEvent::Error(STREAM_FAILED.to_string())
            }
        })
        .scan(false, |failed, event| {
            if *failed {
                return future::ready(None);
            }
            *failed = matches!(event, ProxyEvent::Error(_));
            future::ready(Some(event))
        })
        .map(|event| Event::default().json_data(event))
        .chain(stream::once(future::ready(Ok::<_, axum::Error>(
            Event::default().data(DONE_SENTINEL),
        ))));

    Ok(Sse::new(events).into_response())
}
