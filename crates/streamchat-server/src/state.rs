//! Shared application state injected into every handler.

use std::sync::Arc;

use streamchat_core::{AuthGate, ChatTransport};

#[derive(Clone)]
pub struct AppState {
    pub gate: AuthGate,
    /// Completion backend; always called with `api_key`.
    pub transport: Arc<dyn ChatTransport>,
    pub api_key: String,
}
