//! Live push of freshly persisted messages to chat participants.

use std::collections::HashSet;

use crate::chat::events::{LiveMessage, ServerEvent};
use crate::session::SessionManager;

/// Push a message to every participant of its chat except the sender,
/// across all of each participant's open connections.
///
/// Who receives the message is decided by the participant list the sender
/// attached from the persisted chat, never by room membership: a
/// participant who does not have the conversation open still gets the
/// push on whatever screen they are looking at. Offline participants are
/// skipped; the store already has the message and history sync covers
/// them on their next fetch.
pub fn distribute(sessions: &SessionManager, message: &LiveMessage, sender_id: &str) {
    let Some(participants) = message.chat.participants.as_deref() else {
        tracing::warn!(
            message_id = %message.id,
            chat_id = %message.chat.id,
            "message arrived without a participant list; not delivering"
        );
        return;
    };

    let event = ServerEvent::MessageReceived(Box::new(message.clone()));
    let Some(frame) = event.to_message() else {
        return;
    };

    // Participant lists come from client-attached store data and can repeat
    // ids; each connection gets at most one copy.
    let mut seen = HashSet::new();
    let mut delivered = 0usize;
    for participant in participants {
        if participant == sender_id || !seen.insert(participant.as_str()) {
            continue;
        }
        for connection in sessions.connections_for(participant) {
            if connection.send_raw(frame.clone()) {
                delivered += 1;
            }
        }
    }

    tracing::debug!(
        message_id = %message.id,
        chat_id = %message.chat.id,
        participants = participants.len(),
        delivered,
        "message distributed"
    );
}
