use std::collections::HashSet;

use dashmap::DashMap;

use super::{ConnId, ConnectionHandle};

/// Room membership table. Membership is per-connection, not per-user: each
/// device subscribes to rooms on its own, and only explicit joins put a
/// connection here. A chat's persisted participant list never does.
pub struct RoomTable {
    rooms: DashMap<String, Vec<ConnectionHandle>>,
    /// Reverse index so a disconnect does not have to scan every room.
    joined: DashMap<ConnId, HashSet<String>>,
}

impl RoomTable {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            joined: DashMap::new(),
        }
    }

    /// Subscribe a connection to a room, creating the room on first join.
    /// Joining a room the connection is already in is a no-op.
    pub fn join(&self, room: &str, handle: &ConnectionHandle) {
        {
            let mut members = self.rooms.entry(room.to_string()).or_default();
            if !members.iter().any(|m| m.id() == handle.id()) {
                members.push(handle.clone());
            }
        }
        self.joined
            .entry(handle.id())
            .or_default()
            .insert(room.to_string());
    }

    /// Unsubscribe a connection from one room. Unknown rooms and
    /// non-members are a no-op.
    pub fn leave(&self, room: &str, conn: ConnId) {
        self.remove_member(room, conn);

        let mut drop_index = false;
        if let Some(mut rooms) = self.joined.get_mut(&conn) {
            rooms.remove(room);
            drop_index = rooms.is_empty();
        }
        if drop_index {
            self.joined.remove_if(&conn, |_, rooms| rooms.is_empty());
        }
    }

    /// Unsubscribe a connection from every room it joined. Used on
    /// disconnect so closed connections never linger in member lists.
    pub fn leave_all(&self, conn: ConnId) {
        let Some((_, rooms)) = self.joined.remove(&conn) else {
            return;
        };
        for room in rooms {
            self.remove_member(&room, conn);
        }
    }

    /// Current members of a room. Empty if the room has no subscribers.
    pub fn members_of(&self, room: &str) -> Vec<ConnectionHandle> {
        self.rooms
            .get(room)
            .map(|members| members.clone())
            .unwrap_or_default()
    }

    /// Number of rooms with at least one subscribed connection.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    fn remove_member(&self, room: &str, conn: ConnId) {
        let mut remove_room = false;
        if let Some(mut members) = self.rooms.get_mut(room) {
            members.retain(|m| m.id() != conn);
            remove_room = members.is_empty();
        }
        if remove_room {
            // Rooms are created on demand, so an empty one is just garbage.
            // A racing join keeps the entry alive.
            self.rooms.remove_if(room, |_, members| members.is_empty());
        }
    }
}

impl Default for RoomTable {
    fn default() -> Self {
        Self::new()
    }
}
