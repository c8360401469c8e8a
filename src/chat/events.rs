//! Typed events for the live-chat wire protocol.
//!
//! Every frame on the wire is a JSON object with an `event` tag and an
//! optional `data` payload. Client and server vocabularies are separate
//! enums so neither side can emit an event only the other understands.

use axum::extract::ws::Message;
use serde::{Deserialize, Serialize};

/// Identity a client presents in its `setup` event. The id is the stable
/// user id from the account store; name and email are carried along for
/// display and logging only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

/// Payload of the room-scoped events (join/leave/typing).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomRef {
    pub room: String,
}

/// An attachment already uploaded through the REST API; the live layer
/// only forwards the reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub url: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub name: String,
}

/// The chat a message belongs to. `participants` is the persisted member
/// list attached by the sender after the REST layer stored the message;
/// it is the delivery authorization, entirely separate from who happens
/// to have the room open right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRef {
    #[serde(alias = "_id")]
    pub id: String,
    /// `None` means the client attached no list at all, which is treated
    /// as undeliverable; an empty list is a chat with no other members.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participants: Option<Vec<String>>,
}

/// A freshly persisted message being pushed to the other participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveMessage {
    #[serde(alias = "_id")]
    pub id: String,
    pub sender: UserIdentity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<AttachmentRef>,
    pub chat: ChatRef,
}

/// Whether a presence signal starts or ends a typing indication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceKind {
    Typing,
    StopTyping,
}

/// A transient typing-state notification. Relayed to the room and
/// forgotten; nothing about it is ever stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceSignal {
    pub kind: PresenceKind,
    pub room: String,
}

/// Events a client may send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Identify this connection. Must be the first event; everything else
    /// is discarded until it arrives.
    #[serde(rename = "setup")]
    Setup(UserIdentity),
    /// Subscribe to a chat room for presence signals.
    #[serde(rename = "join room")]
    JoinRoom(RoomRef),
    /// Unsubscribe from a chat room.
    #[serde(rename = "leave room")]
    LeaveRoom(RoomRef),
    /// The user started composing in a room.
    #[serde(rename = "typing")]
    Typing(RoomRef),
    /// The user stopped composing.
    #[serde(rename = "stop typing")]
    StopTyping(RoomRef),
    /// Distribute a message that the REST API just persisted.
    #[serde(rename = "new message")]
    NewMessage(Box<LiveMessage>),
}

/// Events the server may send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Acknowledges a successful `setup`.
    #[serde(rename = "connected")]
    Connected,
    /// Someone else in the room started typing.
    #[serde(rename = "typing")]
    Typing(RoomRef),
    /// Someone else in the room stopped typing.
    #[serde(rename = "stop typing")]
    StopTyping(RoomRef),
    /// A new message in one of the user's chats.
    #[serde(rename = "message received")]
    MessageReceived(Box<LiveMessage>),
}

impl ServerEvent {
    /// Encode into a text frame. Fan-out paths call this once and clone the
    /// resulting frame per recipient instead of re-serializing.
    pub fn to_message(&self) -> Option<Message> {
        match serde_json::to_string(self) {
            Ok(json) => Some(Message::Text(json.into())),
            Err(e) => {
                tracing::error!(error = %e, "failed to encode server event");
                None
            }
        }
    }
}
