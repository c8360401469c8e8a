use std::net::SocketAddr;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, State};
use axum::response::Response;

use crate::state::AppState;
use crate::ws::actor;

/// GET /ws
///
/// Upgrade to a persistent WebSocket. The connection is accepted for
/// anyone; it stays unidentified (and mute) until the client sends its
/// `setup` event over the socket.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    tracing::debug!(peer = %addr, "WebSocket upgrade requested");
    ws.on_upgrade(move |socket| actor::run_connection(socket, state))
}
