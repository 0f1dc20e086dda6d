//! Room hub: live connections, room membership, and event fan-out.
//!
//! Every connection owns an unbounded channel drained by its socket task.
//! Emits push into those channels in call order, so one connection observes
//! events in the order they were emitted.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{
    RwLock,
    mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
};
use uuid::Uuid;

use super::events::ServerEvent;

/// Identifier of one live socket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// A fresh random connection ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

struct Connection {
    sender: UnboundedSender<ServerEvent>,
    rooms: HashSet<String>,
}

#[derive(Default)]
struct HubState {
    connections: HashMap<ConnectionId, Connection>,
    rooms: HashMap<String, HashSet<ConnectionId>>,
}

impl HubState {
    fn drop_connection(&mut self, id: ConnectionId) -> bool {
        let Some(connection) = self.connections.remove(&id) else {
            return false;
        };

        for room in connection.rooms {
            if let Some(members) = self.rooms.get_mut(&room) {
                members.remove(&id);
                if members.is_empty() {
                    self.rooms.remove(&room);
                }
            }
        }
        true
    }
}

/// Registry of live connections keyed by room (conversation ID).
#[derive(Default, Clone)]
pub struct RoomHub {
    inner: Arc<RwLock<HubState>>,
}

impl RoomHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection and return its outbound receiver.
    pub async fn connect(&self) -> (ConnectionId, UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = unbounded_channel();
        let id = ConnectionId::new();

        let mut guard = self.inner.write().await;
        guard.connections.insert(
            id,
            Connection {
                sender: tx,
                rooms: HashSet::new(),
            },
        );

        tracing::debug!(connection = %id, total = guard.connections.len(), "Connection added");
        (id, rx)
    }

    /// Drop a connection and every room membership it holds.
    pub async fn disconnect(&self, id: ConnectionId) {
        let mut guard = self.inner.write().await;
        if guard.drop_connection(id) {
            tracing::debug!(connection = %id, remaining = guard.connections.len(), "Connection removed");
        }
    }

    /// Add a connection to a room.
    ///
    /// Returns `false` when it was already a member or the connection is gone.
    pub async fn join(&self, id: ConnectionId, room: &str) -> bool {
        let mut guard = self.inner.write().await;
        let Some(connection) = guard.connections.get_mut(&id) else {
            return false;
        };

        if !connection.rooms.insert(room.to_string()) {
            return false;
        }

        guard.rooms.entry(room.to_string()).or_default().insert(id);
        true
    }

    /// Whether `id` has joined `room`.
    pub async fn is_member(&self, id: ConnectionId, room: &str) -> bool {
        let guard = self.inner.read().await;
        guard
            .rooms
            .get(room)
            .is_some_and(|members| members.contains(&id))
    }

    /// Send `event` to every connection in `room`.
    ///
    /// Connections whose receiver has been dropped are pruned. Returns the
    /// number of connections the event was delivered to.
    pub async fn emit_to_room(&self, room: &str, event: &ServerEvent) -> usize {
        let mut guard = self.inner.write().await;
        let Some(members) = guard.rooms.get(room) else {
            return 0;
        };
        let members: Vec<ConnectionId> = members.iter().copied().collect();

        let mut delivered = 0;
        let mut dead = Vec::new();
        for id in members {
            match guard.connections.get(&id) {
                Some(connection) if connection.sender.send(event.clone()).is_ok() => {
                    delivered += 1;
                }
                _ => dead.push(id),
            }
        }

        if !dead.is_empty() {
            for id in &dead {
                guard.drop_connection(*id);
            }
            tracing::debug!(room, pruned = dead.len(), active = delivered, "Pruned dead connections");
        }

        delivered
    }

    /// Send `event` to one connection. Returns whether it was delivered.
    pub async fn emit_to(&self, id: ConnectionId, event: ServerEvent) -> bool {
        let mut guard = self.inner.write().await;
        let Some(connection) = guard.connections.get(&id) else {
            return false;
        };

        if connection.sender.send(event).is_ok() {
            true
        } else {
            guard.drop_connection(id);
            false
        }
    }

    /// Number of connections in `room`.
    pub async fn room_size(&self, room: &str) -> usize {
        let guard = self.inner.read().await;
        guard.rooms.get(room).map_or(0, HashSet::len)
    }

    /// Number of live connections.
    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.connections.len()
    }
}
