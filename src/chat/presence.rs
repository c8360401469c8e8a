//! Ephemeral presence relay: typing indicators for whoever has the room
//! open right now.

use crate::chat::events::{PresenceKind, PresenceSignal, RoomRef, ServerEvent};
use crate::session::{ConnId, SessionManager};

/// Forward a typing signal to every member of its room except the
/// originating connection. Best-effort by design of the indicator itself:
/// no ack, no retry, nothing stored. A missed signal corrects itself with
/// the next one, and an empty room means nothing happens at all.
pub fn relay(sessions: &SessionManager, signal: &PresenceSignal, origin: ConnId) {
    let event = match signal.kind {
        PresenceKind::Typing => ServerEvent::Typing(RoomRef {
            room: signal.room.clone(),
        }),
        PresenceKind::StopTyping => ServerEvent::StopTyping(RoomRef {
            room: signal.room.clone(),
        }),
    };
    let Some(frame) = event.to_message() else {
        return;
    };

    let mut relayed = 0usize;
    for member in sessions.members_of(&signal.room) {
        if member.id() == origin {
            continue;
        }
        if member.send_raw(frame.clone()) {
            relayed += 1;
        }
    }

    tracing::trace!(
        room = %signal.room,
        kind = ?signal.kind,
        relayed,
        "presence signal relayed"
    );
}
