use dashmap::DashMap;

use super::{ConnId, ConnectionHandle};

/// Connection registry: tracks all live connections per user.
/// A user can have multiple concurrent connections (multiple devices/tabs),
/// and delivery must target all of them.
pub struct ConnectionRegistry {
    users: DashMap<String, Vec<ConnectionHandle>>,
    /// Reverse index so a disconnect does not have to scan every user.
    owners: DashMap<ConnId, String>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            owners: DashMap::new(),
        }
    }

    /// Add a handle to the user's connection set. Registering a handle that
    /// is already present is a no-op, so repeated setup events are harmless.
    pub fn register(&self, user_id: &str, handle: &ConnectionHandle) {
        if let Some(previous) = self.owners.insert(handle.id(), user_id.to_string()) {
            if previous != user_id {
                // A handle belongs to exactly one user; re-binding moves it
                self.remove_connection(&previous, handle.id());
            }
        }

        let mut connections = self.users.entry(user_id.to_string()).or_default();
        if !connections.iter().any(|c| c.id() == handle.id()) {
            connections.push(handle.clone());
        }

        tracing::debug!(
            user_id = %user_id,
            connections = connections.len(),
            "connection registered"
        );
    }

    /// Remove a connection from its user's set. Unknown handles are a
    /// no-op: disconnects can race and double-fire.
    pub fn unregister(&self, conn: ConnId) {
        let Some((_, user_id)) = self.owners.remove(&conn) else {
            return;
        };
        self.remove_connection(&user_id, conn);

        tracing::debug!(user_id = %user_id, conn_id = conn, "connection unregistered");
    }

    /// All currently open connections for a user. Empty if the user is
    /// offline; never an error.
    pub fn connections_for(&self, user_id: &str) -> Vec<ConnectionHandle> {
        self.users
            .get(user_id)
            .map(|connections| connections.clone())
            .unwrap_or_default()
    }

    /// Number of users with at least one open connection.
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Total number of open connections across all users.
    pub fn connection_count(&self) -> usize {
        self.owners.len()
    }

    fn remove_connection(&self, user_id: &str, conn: ConnId) {
        let mut remove_user = false;
        if let Some(mut connections) = self.users.get_mut(user_id) {
            connections.retain(|c| c.id() != conn);
            remove_user = connections.is_empty();
        }
        if remove_user {
            // A fresh register can slip in between dropping the guard and
            // removing the key; only remove the entry if it is still empty.
            self.users.remove_if(user_id, |_, connections| connections.is_empty());
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
