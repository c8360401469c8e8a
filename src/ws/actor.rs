use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};

use crate::chat::events::UserIdentity;
use crate::state::AppState;
use crate::ws::protocol;

/// Where a connection is in its lifecycle. A connection starts out
/// unidentified and stays that way until a valid `setup` event arrives;
/// events received before that are discarded. Closing is terminal and is
/// represented by the actor returning.
pub enum SessionState {
    Unidentified,
    Identified(UserIdentity),
}

impl SessionState {
    pub fn identity(&self) -> Option<&UserIdentity> {
        match self {
            SessionState::Unidentified => None,
            SessionState::Identified(identity) => Some(identity),
        }
    }
}

/// Run the actor-per-connection pattern for an accepted WebSocket.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, forwards messages from an mpsc channel
/// - Reader task: decodes incoming events, dispatches to protocol handlers
///
/// The mpsc channel allows any part of the system to send frames to this
/// client by cloning the sender; the session manager hands out that sender
/// inside a [`ConnectionHandle`](crate::session::ConnectionHandle).
pub async fn run_connection(socket: WebSocket, state: AppState) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    // Mint the connection's handle. Nothing is registered yet: the client
    // has to identify itself first.
    let handle = state.sessions.new_handle(tx.clone());
    let conn_id = handle.id();
    let mut session = SessionState::Unidentified;

    tracing::info!(conn_id, "WebSocket actor started");

    // Spawn writer task: forwards mpsc messages to the WebSocket sink
    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    // Track pong reception
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();

    // Lets the ping task end the reader loop. A peer that stops answering
    // pings can hold the TCP stream open indefinitely, and then `next()`
    // never returns on its own.
    let (shutdown_tx, mut shutdown_rx) = mpsc::unbounded_channel::<()>();

    // Spawn ping task: sends periodic pings and monitors pong responses so
    // abruptly dropped clients do not leak registry entries
    let ping_tx = tx.clone();
    let ping_interval = state.keepalive.ping_interval();
    let pong_timeout = state.keepalive.pong_timeout();
    let ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(ping_interval);
        // Skip the first immediate tick
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;

            if ping_tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
                // Writer task has died — connection is gone
                break;
            }

            // Wait for pong within timeout
            match timeout(pong_timeout, pong_rx.recv()).await {
                Ok(Some(())) => {
                    // Pong received, continue
                }
                _ => {
                    // Pong timeout or channel closed — close connection
                    tracing::warn!(conn_id, "Pong timeout, closing connection");
                    let _ = ping_tx.send(Message::Close(Some(CloseFrame {
                        code: 1001,
                        reason: "Pong timeout".into(),
                    })));
                    break;
                }
            }
        }

        // The reader may be parked on a dead peer; wake it so cleanup runs
        let _ = shutdown_tx.send(());
    });

    // Reader loop: process incoming WebSocket messages. The ping task signals
    // shutdown when it gives up on the peer.
    loop {
        let received = tokio::select! {
            received = ws_receiver.next() => received,
            _ = shutdown_rx.recv() => {
                tracing::info!(conn_id, "Closing unresponsive connection");
                break;
            }
        };

        match received {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => {
                    protocol::handle_frame(text.as_str(), &state, &handle, &mut session);
                }
                Message::Binary(_) => {
                    // The protocol is JSON text; binary frames carry nothing
                    tracing::debug!(conn_id, "Ignoring binary frame");
                }
                Message::Pong(_) => {
                    // Pong received — notify the ping task
                    let _ = pong_tx.send(());
                }
                Message::Ping(data) => {
                    // Respond to client pings with pong
                    let _ = tx.send(Message::Pong(data));
                }
                Message::Close(frame) => {
                    tracing::info!(conn_id, reason = ?frame, "Client initiated close");
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(conn_id, error = %e, "WebSocket receive error");
                break;
            }
            None => {
                // Stream ended — client disconnected
                tracing::info!(conn_id, "WebSocket stream ended");
                break;
            }
        }
    }

    // Cleanup: abort writer and ping tasks
    writer_handle.abort();
    ping_handle.abort();

    // Tear down session state: registry entry first, then room memberships.
    // The reader loop is done, so no event can resurrect this connection.
    state.sessions.disconnect(conn_id);

    match session.identity() {
        Some(identity) => {
            tracing::info!(conn_id, user_id = %identity.id, "WebSocket actor stopped");
        }
        None => {
            tracing::info!(conn_id, "WebSocket actor stopped before setup");
        }
    }
}

/// Writer task: receives messages from mpsc channel and forwards them to the WebSocket sink.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        if ws_sender.send(msg).await.is_err() {
            // WebSocket send failed — connection is broken
            break;
        }
    }
}
