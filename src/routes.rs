use axum::{extract::State, Json, Router};
use serde::{Deserialize, Serialize};

use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Public server info response (visible to anyone)
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerInfoResponse {
    pub name: String,
    pub version: String,
    /// Users with at least one open WebSocket connection
    pub online_users: usize,
    /// Open, identified WebSocket connections (a user can hold several)
    pub live_connections: usize,
    /// Rooms with at least one subscribed connection
    pub open_rooms: usize,
}

/// GET /api/info - Public endpoint, no auth required
async fn server_info(State(state): State<AppState>) -> Json<ServerInfoResponse> {
    Json(ServerInfoResponse {
        name: state.server_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        online_users: state.sessions.online_users(),
        live_connections: state.sessions.live_connections(),
        open_rooms: state.sessions.open_rooms(),
    })
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}

/// Build the full axum Router with all routes.
pub fn build_router(state: AppState) -> Router {
    // Public info routes (no auth required)
    let public_routes = Router::new()
        .route("/api/info", axum::routing::get(server_info))
        .route("/api/health", axum::routing::get(health_check));

    // WebSocket endpoint (identification happens in-band via `setup`)
    let ws_routes = Router::new().route("/ws", axum::routing::get(ws_handler::ws_upgrade));

    Router::new()
        .merge(public_routes)
        .merge(ws_routes)
        .with_state(state)
}
