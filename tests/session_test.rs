//! Tests for the session tables and delivery paths: connection registry,
//! room membership, typing relay scoping, and message fan-out.
//!
//! These drive the session manager directly through fake connections
//! (unbounded channels) so every delivery decision can be asserted
//! synchronously.

use axum::extract::ws::Message;
use serde_json::Value;
use tokio::sync::mpsc;

use huddle_server::chat::events::{
    AttachmentRef, ChatRef, LiveMessage, PresenceKind, PresenceSignal, UserIdentity,
};
use huddle_server::chat::{fanout, presence};
use huddle_server::session::{ConnectionHandle, SessionManager};

/// Open a fake connection: a handle plus the receiver that stands in for
/// the connection's writer task.
fn open_conn(sessions: &SessionManager) -> (ConnectionHandle, mpsc::UnboundedReceiver<Message>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (sessions.new_handle(tx), rx)
}

/// Pop the next queued frame as JSON, or None if nothing was delivered.
fn next_event(rx: &mut mpsc::UnboundedReceiver<Message>) -> Option<Value> {
    match rx.try_recv() {
        Ok(Message::Text(text)) => {
            Some(serde_json::from_str(text.as_str()).expect("Delivered frame should be valid JSON"))
        }
        Ok(other) => panic!("Expected text frame, got: {:?}", other),
        Err(_) => None,
    }
}

fn identity(id: &str) -> UserIdentity {
    UserIdentity {
        id: id.to_string(),
        name: format!("User {}", id),
        email: format!("{}@example.com", id),
    }
}

fn sample_message(
    id: &str,
    sender_id: &str,
    chat_id: &str,
    participants: Option<&[&str]>,
) -> LiveMessage {
    LiveMessage {
        id: id.to_string(),
        sender: identity(sender_id),
        content: Some("hello there".to_string()),
        attachment: None,
        chat: ChatRef {
            id: chat_id.to_string(),
            participants: participants.map(|p| p.iter().map(|s| s.to_string()).collect()),
        },
    }
}

#[tokio::test]
async fn test_register_tracks_all_connections_of_a_user() {
    let sessions = SessionManager::new();
    let (phone, _phone_rx) = open_conn(&sessions);
    let (laptop, _laptop_rx) = open_conn(&sessions);

    sessions.register("u1", &phone);
    sessions.register("u1", &laptop);

    assert_eq!(sessions.connections_for("u1").len(), 2);
    assert_eq!(sessions.online_users(), 1);
    assert_eq!(sessions.live_connections(), 2);
}

#[tokio::test]
async fn test_register_same_connection_twice_is_noop() {
    let sessions = SessionManager::new();
    let (conn, _rx) = open_conn(&sessions);

    sessions.register("u1", &conn);
    sessions.register("u1", &conn);

    assert_eq!(sessions.connections_for("u1").len(), 1);
    assert_eq!(sessions.live_connections(), 1);
}

#[tokio::test]
async fn test_unregister_unknown_connection_is_noop() {
    let sessions = SessionManager::new();
    let (conn, _rx) = open_conn(&sessions);
    sessions.register("u1", &conn);

    // An id that was never registered
    sessions.unregister(conn.id() + 1000);

    assert_eq!(sessions.connections_for("u1").len(), 1);
    assert_eq!(sessions.online_users(), 1);
}

#[tokio::test]
async fn test_unregister_removes_only_the_owning_users_entry() {
    let sessions = SessionManager::new();
    let (alice_phone, _alice_phone_rx) = open_conn(&sessions);
    let (alice_laptop, _alice_laptop_rx) = open_conn(&sessions);
    let (bob, _bob_rx) = open_conn(&sessions);

    sessions.register("alice", &alice_phone);
    sessions.register("alice", &alice_laptop);
    sessions.register("bob", &bob);

    sessions.unregister(alice_phone.id());

    assert_eq!(sessions.connections_for("alice").len(), 1);
    assert_eq!(sessions.connections_for("alice")[0].id(), alice_laptop.id());
    assert_eq!(sessions.connections_for("bob").len(), 1);
    assert_eq!(sessions.online_users(), 2);
    assert_eq!(sessions.live_connections(), 2);

    // A second unregister of the same id is inert
    sessions.unregister(alice_phone.id());
    assert_eq!(sessions.live_connections(), 2);
}

#[tokio::test]
async fn test_a_connection_belongs_to_one_user() {
    let sessions = SessionManager::new();
    let (conn, _rx) = open_conn(&sessions);

    sessions.register("u1", &conn);
    sessions.register("u2", &conn);

    assert!(sessions.connections_for("u1").is_empty());
    assert_eq!(sessions.connections_for("u2").len(), 1);
    assert_eq!(sessions.online_users(), 1);
    assert_eq!(sessions.live_connections(), 1);

    // Teardown finds it under its current owner
    sessions.unregister(conn.id());
    assert!(sessions.connections_for("u2").is_empty());
    assert_eq!(sessions.live_connections(), 0);
}

#[tokio::test]
async fn test_disconnect_clears_registry_and_all_memberships() {
    let sessions = SessionManager::new();
    let (conn, _rx) = open_conn(&sessions);

    sessions.register("u1", &conn);
    sessions.join("r1", &conn);
    sessions.join("r2", &conn);
    assert_eq!(sessions.open_rooms(), 2);

    sessions.disconnect(conn.id());

    assert!(sessions.connections_for("u1").is_empty());
    assert!(sessions.members_of("r1").is_empty());
    assert!(sessions.members_of("r2").is_empty());
    assert_eq!(sessions.online_users(), 0);
    assert_eq!(sessions.live_connections(), 0);
    assert_eq!(sessions.open_rooms(), 0);
}

#[tokio::test]
async fn test_unregister_and_leave_all_are_independent() {
    let sessions = SessionManager::new();
    let (conn, _rx) = open_conn(&sessions);

    sessions.register("u1", &conn);
    sessions.join("r1", &conn);
    sessions.join("r2", &conn);

    // Dropping the registry entry does not touch room membership
    sessions.unregister(conn.id());
    assert!(sessions.connections_for("u1").is_empty());
    assert_eq!(sessions.members_of("r1").len(), 1);

    // And clearing memberships does not require a registry entry
    sessions.leave_all(conn.id());
    assert!(sessions.members_of("r1").is_empty());
    assert!(sessions.members_of("r2").is_empty());
    assert_eq!(sessions.open_rooms(), 0);
}

#[tokio::test]
async fn test_join_is_idempotent_and_leave_is_scoped() {
    let sessions = SessionManager::new();
    let (conn, _rx) = open_conn(&sessions);

    sessions.join("r1", &conn);
    sessions.join("r1", &conn);
    sessions.join("r2", &conn);
    assert_eq!(sessions.members_of("r1").len(), 1);

    sessions.leave("r1", conn.id());
    assert!(sessions.members_of("r1").is_empty());
    assert_eq!(sessions.members_of("r2").len(), 1);

    // Leaving a room it never joined changes nothing
    sessions.leave("r9", conn.id());
    assert_eq!(sessions.members_of("r2").len(), 1);
    assert_eq!(sessions.open_rooms(), 1);
}

#[tokio::test]
async fn test_typing_relay_reaches_other_members_only() {
    let sessions = SessionManager::new();
    let (alice, mut alice_rx) = open_conn(&sessions);
    let (bob, mut bob_rx) = open_conn(&sessions);
    let (carol, mut carol_rx) = open_conn(&sessions);

    sessions.join("r1", &alice);
    sessions.join("r1", &bob);
    sessions.join("r2", &carol);

    let signal = PresenceSignal {
        kind: PresenceKind::Typing,
        room: "r1".to_string(),
    };
    presence::relay(&sessions, &signal, alice.id());

    let event = next_event(&mut bob_rx).expect("Bob should see the typing signal");
    assert_eq!(event["event"], "typing");
    assert_eq!(event["data"]["room"], "r1");

    assert!(next_event(&mut alice_rx).is_none(), "Origin must not hear its own typing");
    assert!(next_event(&mut carol_rx).is_none(), "Other rooms must not hear it");
}

#[tokio::test]
async fn test_stop_typing_relay_carries_the_room() {
    let sessions = SessionManager::new();
    let (alice, _alice_rx) = open_conn(&sessions);
    let (bob, mut bob_rx) = open_conn(&sessions);

    sessions.join("r1", &alice);
    sessions.join("r1", &bob);

    let signal = PresenceSignal {
        kind: PresenceKind::StopTyping,
        room: "r1".to_string(),
    };
    presence::relay(&sessions, &signal, alice.id());

    let event = next_event(&mut bob_rx).expect("Bob should see the stop-typing signal");
    assert_eq!(event["event"], "stop typing");
    assert_eq!(event["data"]["room"], "r1");
}

#[tokio::test]
async fn test_typing_relay_in_empty_room_does_nothing() {
    let sessions = SessionManager::new();
    let (alice, mut alice_rx) = open_conn(&sessions);

    let signal = PresenceSignal {
        kind: PresenceKind::Typing,
        room: "nobody-here".to_string(),
    };
    presence::relay(&sessions, &signal, alice.id());

    assert!(next_event(&mut alice_rx).is_none());
}

#[tokio::test]
async fn test_fanout_reaches_every_connection_of_every_recipient() {
    let sessions = SessionManager::new();
    let (alice, mut alice_rx) = open_conn(&sessions);
    let (bob_phone, mut bob_phone_rx) = open_conn(&sessions);
    let (bob_laptop, mut bob_laptop_rx) = open_conn(&sessions);
    let (carol, mut carol_rx) = open_conn(&sessions);

    sessions.register("alice", &alice);
    sessions.register("bob", &bob_phone);
    sessions.register("bob", &bob_laptop);
    sessions.register("carol", &carol);

    let message = sample_message("m1", "alice", "c1", Some(&["alice", "bob", "carol"]));
    fanout::distribute(&sessions, &message, "alice");

    for rx in [&mut bob_phone_rx, &mut bob_laptop_rx, &mut carol_rx] {
        let event = next_event(rx).expect("Recipient connection should get the message");
        assert_eq!(event["event"], "message received");
        assert_eq!(event["data"]["id"], "m1");
        assert_eq!(event["data"]["chat"]["id"], "c1");
        assert_eq!(event["data"]["content"], "hello there");
    }

    assert!(
        next_event(&mut alice_rx).is_none(),
        "Sender must not receive their own message"
    );
}

#[tokio::test]
async fn test_fanout_excludes_sender_on_all_their_connections() {
    let sessions = SessionManager::new();
    let (alice_phone, mut alice_phone_rx) = open_conn(&sessions);
    let (alice_laptop, mut alice_laptop_rx) = open_conn(&sessions);
    let (bob, mut bob_rx) = open_conn(&sessions);

    sessions.register("alice", &alice_phone);
    sessions.register("alice", &alice_laptop);
    sessions.register("bob", &bob);

    let message = sample_message("m2", "alice", "c1", Some(&["alice", "bob"]));
    fanout::distribute(&sessions, &message, "alice");

    assert!(next_event(&mut bob_rx).is_some());
    assert!(next_event(&mut alice_phone_rx).is_none());
    assert!(next_event(&mut alice_laptop_rx).is_none());
}

#[tokio::test]
async fn test_fanout_is_driven_by_participants_not_membership() {
    let sessions = SessionManager::new();
    let (alice, _alice_rx) = open_conn(&sessions);
    let (bob, mut bob_rx) = open_conn(&sessions);
    let (dave, mut dave_rx) = open_conn(&sessions);

    sessions.register("alice", &alice);
    sessions.register("bob", &bob);
    sessions.register("dave", &dave);

    // Only alice and bob have the conversation open
    sessions.join("c1", &alice);
    sessions.join("c1", &bob);

    let message = sample_message("m3", "alice", "c1", Some(&["alice", "bob", "dave"]));
    fanout::distribute(&sessions, &message, "alice");

    assert!(next_event(&mut bob_rx).is_some());
    assert!(
        next_event(&mut dave_rx).is_some(),
        "A participant gets the message even without joining the room"
    );

    // Typing in the same chat stays room-scoped: dave is not a member
    let signal = PresenceSignal {
        kind: PresenceKind::Typing,
        room: "c1".to_string(),
    };
    presence::relay(&sessions, &signal, alice.id());

    assert!(next_event(&mut bob_rx).is_some());
    assert!(
        next_event(&mut dave_rx).is_none(),
        "Presence must not leak outside the room"
    );
}

#[tokio::test]
async fn test_fanout_without_participant_list_delivers_nothing() {
    let sessions = SessionManager::new();
    let (alice, mut alice_rx) = open_conn(&sessions);
    let (bob, mut bob_rx) = open_conn(&sessions);

    sessions.register("alice", &alice);
    sessions.register("bob", &bob);
    sessions.join("c1", &bob);

    let message = sample_message("m4", "alice", "c1", None);
    fanout::distribute(&sessions, &message, "alice");

    assert!(next_event(&mut alice_rx).is_none());
    assert!(next_event(&mut bob_rx).is_none());
}

#[tokio::test]
async fn test_fanout_skips_offline_participants() {
    let sessions = SessionManager::new();
    let (alice, _alice_rx) = open_conn(&sessions);
    let (bob, mut bob_rx) = open_conn(&sessions);

    sessions.register("alice", &alice);
    sessions.register("bob", &bob);
    // "mallory" never connected

    let message = sample_message("m5", "alice", "c1", Some(&["alice", "bob", "mallory"]));
    fanout::distribute(&sessions, &message, "alice");

    assert!(next_event(&mut bob_rx).is_some());
}

#[tokio::test]
async fn test_fanout_delivers_once_per_connection_despite_duplicates() {
    let sessions = SessionManager::new();
    let (alice, _alice_rx) = open_conn(&sessions);
    let (bob, mut bob_rx) = open_conn(&sessions);

    sessions.register("alice", &alice);
    sessions.register("bob", &bob);

    let message = sample_message("m6", "alice", "c1", Some(&["bob", "bob", "bob"]));
    fanout::distribute(&sessions, &message, "alice");

    assert!(next_event(&mut bob_rx).is_some());
    assert!(next_event(&mut bob_rx).is_none(), "Duplicates in the list must not double-send");
}

#[tokio::test]
async fn test_fanout_forwards_attachment_references() {
    let sessions = SessionManager::new();
    let (alice, _alice_rx) = open_conn(&sessions);
    let (bob, mut bob_rx) = open_conn(&sessions);

    sessions.register("alice", &alice);
    sessions.register("bob", &bob);

    let mut message = sample_message("m7", "alice", "c1", Some(&["alice", "bob"]));
    message.content = None;
    message.attachment = Some(AttachmentRef {
        url: "https://cdn.example.com/uploads/pic.png".to_string(),
        kind: "image/png".to_string(),
        name: "pic.png".to_string(),
    });
    fanout::distribute(&sessions, &message, "alice");

    let event = next_event(&mut bob_rx).expect("Bob should get the attachment message");
    assert_eq!(event["data"]["attachment"]["url"], "https://cdn.example.com/uploads/pic.png");
    assert_eq!(event["data"]["attachment"]["type"], "image/png");
    assert!(event["data"].get("content").is_none() || event["data"]["content"].is_null());
}

#[tokio::test]
async fn test_delivery_to_closed_connection_is_best_effort() {
    let sessions = SessionManager::new();
    let (alice, _alice_rx) = open_conn(&sessions);
    let (bob_stale, bob_stale_rx) = open_conn(&sessions);
    let (bob_live, mut bob_live_rx) = open_conn(&sessions);

    sessions.register("alice", &alice);
    sessions.register("bob", &bob_stale);
    sessions.register("bob", &bob_live);

    // Simulate a connection whose writer died before cleanup ran
    drop(bob_stale_rx);

    let message = sample_message("m8", "alice", "c1", Some(&["alice", "bob"]));
    fanout::distribute(&sessions, &message, "alice");

    assert!(
        next_event(&mut bob_live_rx).is_some(),
        "A dead sibling connection must not block delivery"
    );
}
