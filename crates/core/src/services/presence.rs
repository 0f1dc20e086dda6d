//! Presence registry: which connection currently represents a user.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::hub::ConnectionId;

/// Maps online users to their live connection. The last registration wins.
#[async_trait]
pub trait PresenceRegistry: Send + Sync {
    /// Record `connection` as the live connection of `user_id`.
    async fn register(&self, user_id: &str, connection: ConnectionId);

    /// The live connection of `user_id`, if any.
    async fn lookup(&self, user_id: &str) -> Option<ConnectionId>;

    /// Forget `connection`. Returns the user it belonged to.
    ///
    /// A user who has since registered a newer connection is left alone.
    async fn remove(&self, connection: ConnectionId) -> Option<String>;
}

/// Single-process presence backed by a map.
#[derive(Default)]
pub struct InMemoryPresence {
    entries: RwLock<HashMap<String, ConnectionId>>,
}

impl InMemoryPresence {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PresenceRegistry for InMemoryPresence {
    async fn register(&self, user_id: &str, connection: ConnectionId) {
        let previous = self
            .entries
            .write()
            .await
            .insert(user_id.to_string(), connection);

        if previous.is_some_and(|p| p != connection) {
            tracing::debug!(user_id, connection = %connection, "Presence replaced by newer connection");
        }
    }

    async fn lookup(&self, user_id: &str) -> Option<ConnectionId> {
        self.entries.read().await.get(user_id).copied()
    }

    async fn remove(&self, connection: ConnectionId) -> Option<String> {
        let mut entries = self.entries.write().await;
        let user_id = entries
            .iter()
            .find(|(_, c)| **c == connection)
            .map(|(u, _)| u.clone())?;
        entries.remove(&user_id);
        Some(user_id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_and_lookup() {
        let presence = InMemoryPresence::new();
        let conn = ConnectionId::new();

        presence.register("alice", conn).await;
        assert_eq!(presence.lookup("alice").await, Some(conn));
        assert_eq!(presence.lookup("bob").await, None);
    }

    #[tokio::test]
    async fn test_last_registration_wins() {
        let presence = InMemoryPresence::new();
        let first = ConnectionId::new();
        let second = ConnectionId::new();

        presence.register("alice", first).await;
        presence.register("alice", second).await;
        assert_eq!(presence.lookup("alice").await, Some(second));

        // The stale connection closing must not evict the newer one.
        assert_eq!(presence.remove(first).await, None);
        assert_eq!(presence.lookup("alice").await, Some(second));
    }

    #[tokio::test]
    async fn test_remove() {
        let presence = InMemoryPresence::new();
        let conn = ConnectionId::new();
        presence.register("alice", conn).await;

        assert_eq!(presence.remove(conn).await.as_deref(), Some("alice"));
        assert_eq!(presence.lookup("alice").await, None);
    }
}
