use std::sync::Arc;

use crate::config::KeepaliveConfig;
use crate::session::SessionManager;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Live connection registry and room membership tables
    pub sessions: Arc<SessionManager>,
    /// WebSocket keepalive tuning
    pub keepalive: KeepaliveConfig,
    /// Server name reported by /api/info
    pub server_name: String,
}
