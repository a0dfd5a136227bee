//! Handler error type.
//!
//! Upstream failures are logged in full; the caller only sees a generic
//! message so the provider key and URLs never leak.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use streamchat_core::TransportError;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ServerError {
    /// Missing or wrong access key.
    #[error("unauthorized")]
    Unauthorized,

    #[error("bad request: {0}")]
    BadRequest(String),

    /// The provider could not start a completion.
    #[error("upstream error: {0}")]
    Upstream(#[from] TransportError),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, client_message) = match &self {
            ServerError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized".to_owned()),
            ServerError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            ServerError::Upstream(e) => {
                error!(error = %e, "upstream completion failed");
                (StatusCode::BAD_GATEWAY, "upstream completion failed".to_owned())
            }
        };
        (status, Json(json!({ "error": client_message }))).into_response()
    }
}
