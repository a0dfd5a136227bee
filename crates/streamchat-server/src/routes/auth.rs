use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use streamchat_core::transport::{AuthRequest, AuthResponse};
use tracing::info;

use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/api/auth", post(check_auth))
}

/// `POST /api/auth`: exact comparison against the shared secret.
pub async fn check_auth(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AuthRequest>,
) -> Json<AuthResponse> {
    let ok = state.gate.check(&req.access_key);
    if !ok {
        info!("access key rejected");
    }
    Json(AuthResponse { ok })
}
