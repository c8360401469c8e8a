//! Inbound event decoding and dispatch.
//!
//! One function per client event keeps the dispatch table flat. All
//! handlers are synchronous: every operation here touches only the
//! in-memory session tables, so nothing needs to await.

use crate::chat::events::{ClientEvent, PresenceKind, PresenceSignal, ServerEvent, UserIdentity};
use crate::chat::{fanout, presence};
use crate::session::ConnectionHandle;
use crate::state::AppState;
use crate::ws::actor::SessionState;

/// Decode one text frame and dispatch the event it carries. Malformed
/// frames are logged and dropped; the connection stays open and keeps its
/// current state.
pub fn handle_frame(
    text: &str,
    state: &AppState,
    handle: &ConnectionHandle,
    session: &mut SessionState,
) {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(
                conn_id = handle.id(),
                error = %e,
                "Discarding malformed event"
            );
            return;
        }
    };

    dispatch(event, state, handle, session);
}

fn dispatch(
    event: ClientEvent,
    state: &AppState,
    handle: &ConnectionHandle,
    session: &mut SessionState,
) {
    match event {
        ClientEvent::Setup(identity) => handle_setup(identity, state, handle, session),
        ClientEvent::JoinRoom(room) => {
            let Some(identity) = identified(session, handle, "join room") else {
                return;
            };
            state.sessions.join(&room.room, handle);
            tracing::debug!(
                conn_id = handle.id(),
                user_id = %identity.id,
                room = %room.room,
                "Joined room"
            );
        }
        ClientEvent::LeaveRoom(room) => {
            let Some(identity) = identified(session, handle, "leave room") else {
                return;
            };
            state.sessions.leave(&room.room, handle.id());
            tracing::debug!(
                conn_id = handle.id(),
                user_id = %identity.id,
                room = %room.room,
                "Left room"
            );
        }
        ClientEvent::Typing(room) => {
            if identified(session, handle, "typing").is_none() {
                return;
            }
            let signal = PresenceSignal {
                kind: PresenceKind::Typing,
                room: room.room,
            };
            presence::relay(&state.sessions, &signal, handle.id());
        }
        ClientEvent::StopTyping(room) => {
            if identified(session, handle, "stop typing").is_none() {
                return;
            }
            let signal = PresenceSignal {
                kind: PresenceKind::StopTyping,
                room: room.room,
            };
            presence::relay(&state.sessions, &signal, handle.id());
        }
        ClientEvent::NewMessage(message) => {
            let Some(identity) = identified(session, handle, "new message") else {
                return;
            };
            // The sender is whoever this connection authenticated as, not
            // whatever the payload claims.
            let sender_id = identity.id.clone();
            fanout::distribute(&state.sessions, &message, &sender_id);
        }
    }
}

/// Bind the connection to a user identity and confirm with `connected`.
///
/// A repeated setup with the same identity is acknowledged again but
/// changes nothing. A setup that tries to switch the connection to a
/// different user is refused; the connection keeps its original binding.
fn handle_setup(
    identity: UserIdentity,
    state: &AppState,
    handle: &ConnectionHandle,
    session: &mut SessionState,
) {
    if identity.id.trim().is_empty() {
        tracing::warn!(conn_id = handle.id(), "Setup without a user id, discarding");
        return;
    }

    if let Some(current) = session.identity() {
        if current.id != identity.id {
            tracing::warn!(
                conn_id = handle.id(),
                user_id = %current.id,
                rejected = %identity.id,
                "Setup with a different identity on a bound connection, refusing"
            );
            return;
        }
    }

    state.sessions.register(&identity.id, handle);
    tracing::info!(
        conn_id = handle.id(),
        user_id = %identity.id,
        "Connection identified"
    );

    if let Some(frame) = ServerEvent::Connected.to_message() {
        let _ = handle.send_raw(frame);
    }

    *session = SessionState::Identified(identity);
}

/// Events other than `setup` require an identified connection; everything
/// arriving earlier is dropped without a reply.
fn identified<'a>(
    session: &'a SessionState,
    handle: &ConnectionHandle,
    event: &str,
) -> Option<&'a UserIdentity> {
    let identity = session.identity();
    if identity.is_none() {
        tracing::debug!(
            conn_id = handle.id(),
            event,
            "Discarding event from unidentified connection"
        );
    }
    identity
}
