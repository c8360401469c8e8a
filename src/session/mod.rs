//! Live session state shared across all connections.
//!
//! The [`SessionManager`] owns the two mutable tables of the real-time
//! layer: the connection registry (which users are online, on which
//! connections) and the room membership table (which connections subscribed
//! to which rooms). It is built once at startup and shared via `Arc`;
//! every operation takes `&self` and is safe to call from any task.

pub mod registry;
pub mod rooms;

use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::Message;
use tokio::sync::mpsc;

use self::registry::ConnectionRegistry;
use self::rooms::RoomTable;

/// Sender half of a connection's outbound queue. Cloning this is how any
/// part of the server pushes frames to a specific client.
pub type ConnectionSender = mpsc::UnboundedSender<Message>;

/// Identifier of a single live connection, unique for the process lifetime.
pub type ConnId = u64;

/// Handle to one live bidirectional channel: the connection id plus the
/// sender feeding its writer task. Cheap to clone; compared by id.
#[derive(Clone)]
pub struct ConnectionHandle {
    id: ConnId,
    tx: ConnectionSender,
}

impl ConnectionHandle {
    pub fn id(&self) -> ConnId {
        self.id
    }

    /// Queue one frame on this connection. Returns false when the writer
    /// task is gone; callers treat that as a lost best-effort delivery.
    pub fn send_raw(&self, msg: Message) -> bool {
        self.tx.send(msg).is_ok()
    }
}

pub struct SessionManager {
    registry: ConnectionRegistry,
    rooms: RoomTable,
    next_conn_id: AtomicU64,
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            rooms: RoomTable::new(),
            next_conn_id: AtomicU64::new(1),
        }
    }

    /// Mint a handle for a newly accepted connection. The handle is not yet
    /// registered anywhere; that only happens once the client identifies
    /// itself.
    pub fn new_handle(&self, tx: ConnectionSender) -> ConnectionHandle {
        ConnectionHandle {
            id: self.next_conn_id.fetch_add(1, Ordering::Relaxed),
            tx,
        }
    }

    /// Bind a connection to a user identity, making it reachable for
    /// message delivery. Idempotent per handle.
    pub fn register(&self, user_id: &str, handle: &ConnectionHandle) {
        self.registry.register(user_id, handle);
    }

    /// Remove a connection from the registry. Unknown ids are a no-op.
    pub fn unregister(&self, conn: ConnId) {
        self.registry.unregister(conn);
    }

    /// All open connections belonging to a user, across all their devices.
    pub fn connections_for(&self, user_id: &str) -> Vec<ConnectionHandle> {
        self.registry.connections_for(user_id)
    }

    /// Subscribe a connection to a room.
    pub fn join(&self, room: &str, handle: &ConnectionHandle) {
        self.rooms.join(room, handle);
    }

    /// Unsubscribe a connection from a room.
    pub fn leave(&self, room: &str, conn: ConnId) {
        self.rooms.leave(room, conn);
    }

    /// Unsubscribe a connection from every room it joined.
    pub fn leave_all(&self, conn: ConnId) {
        self.rooms.leave_all(conn);
    }

    /// Connections currently subscribed to a room.
    pub fn members_of(&self, room: &str) -> Vec<ConnectionHandle> {
        self.rooms.members_of(room)
    }

    /// Full teardown for a closed connection: registry first, then room
    /// memberships, so a concurrent fan-out cannot pick the connection up
    /// after its rooms are gone.
    pub fn disconnect(&self, conn: ConnId) {
        self.registry.unregister(conn);
        self.rooms.leave_all(conn);
    }

    /// Number of distinct users with at least one open connection.
    pub fn online_users(&self) -> usize {
        self.registry.user_count()
    }

    /// Total open, identified connections.
    pub fn live_connections(&self) -> usize {
        self.registry.connection_count()
    }

    /// Rooms with at least one subscriber.
    pub fn open_rooms(&self) -> usize {
        self.rooms.room_count()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}
