//! Session Registry
//!
//! Tracks which connection is in which room and owns the per-connection
//! outbound channels. All event delivery (the transport) goes through
//! `send` / `send_to_room`; broadcast scope is always one room.

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use crate::board::{BoardId, ConnectionId};
use crate::network::protocol::ServerEvent;

/// Per-connection bookkeeping.
struct ConnectedClient {
    /// Current room, if joined.
    room: Option<BoardId>,
    /// Last inbound activity (idle cleanup).
    last_activity: Instant,
    /// Outbound event channel to this client.
    sender: mpsc::Sender<ServerEvent>,
}

/// Connection ⇄ room bookkeeping plus event delivery.
///
/// Process-global, owned component: the server holds one instance and the
/// engine fans events out through it. Rooms are created on first join and
/// removed when their last member leaves.
#[derive(Default)]
pub struct SessionRegistry {
    clients: RwLock<BTreeMap<ConnectionId, ConnectedClient>>,
    rooms: RwLock<BTreeMap<BoardId, BTreeSet<ConnectionId>>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly accepted connection (not yet in any room).
    pub async fn register(&self, conn: ConnectionId, sender: mpsc::Sender<ServerEvent>) {
        let mut clients = self.clients.write().await;
        clients.insert(
            conn,
            ConnectedClient {
                room: None,
                last_activity: Instant::now(),
                sender,
            },
        );
    }

    /// Remove a connection entirely. Returns the room it was in, if any.
    pub async fn unregister(&self, conn: ConnectionId) -> Option<BoardId> {
        let old_room = {
            let mut clients = self.clients.write().await;
            clients.remove(&conn).and_then(|c| c.room)
        };

        if let Some(room) = &old_room {
            self.leave_room_set(room, conn).await;
        }
        old_room
    }

    /// Move a connection into `room`, leaving any previous room.
    /// Returns the previous room, if there was one.
    pub async fn join(&self, conn: ConnectionId, room: BoardId) -> Option<BoardId> {
        let old_room = {
            let mut clients = self.clients.write().await;
            match clients.get_mut(&conn) {
                Some(client) => client.room.replace(room.clone()),
                None => return None,
            }
        };

        if let Some(old) = &old_room {
            self.leave_room_set(old, conn).await;
        }

        let mut rooms = self.rooms.write().await;
        rooms.entry(room.clone()).or_default().insert(conn);
        debug!(conn = %conn, room = %room, "joined room");

        old_room
    }

    async fn leave_room_set(&self, room: &BoardId, conn: ConnectionId) {
        let mut rooms = self.rooms.write().await;
        if let Some(members) = rooms.get_mut(room) {
            members.remove(&conn);
            if members.is_empty() {
                rooms.remove(room);
            }
        }
    }

    /// Room the connection is currently joined to.
    pub async fn room_of(&self, conn: ConnectionId) -> Option<BoardId> {
        let clients = self.clients.read().await;
        clients.get(&conn).and_then(|c| c.room.clone())
    }

    /// Connections currently joined to `room`.
    pub async fn members(&self, room: &BoardId) -> Vec<ConnectionId> {
        let rooms = self.rooms.read().await;
        rooms
            .get(room)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Record inbound activity for idle tracking.
    pub async fn touch(&self, conn: ConnectionId) {
        let mut clients = self.clients.write().await;
        if let Some(client) = clients.get_mut(&conn) {
            client.last_activity = Instant::now();
        }
    }

    /// Connections idle for longer than `timeout`.
    pub async fn idle_connections(&self, timeout: Duration) -> Vec<ConnectionId> {
        let now = Instant::now();
        let clients = self.clients.read().await;
        clients
            .iter()
            .filter(|(_, c)| now.duration_since(c.last_activity) > timeout)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Deliver an event to one connection. Delivery is best-effort: a full
    /// or closed channel drops the event.
    pub async fn send(&self, conn: ConnectionId, event: ServerEvent) {
        let sender = {
            let clients = self.clients.read().await;
            clients.get(&conn).map(|c| c.sender.clone())
        };
        if let Some(sender) = sender {
            let _ = sender.send(event).await;
        }
    }

    /// Deliver an event to every member of `room`, optionally excluding
    /// one connection (the originator).
    pub async fn send_to_room(
        &self,
        room: &BoardId,
        event: ServerEvent,
        except: Option<ConnectionId>,
    ) {
        let senders: Vec<mpsc::Sender<ServerEvent>> = {
            let rooms = self.rooms.read().await;
            let Some(members) = rooms.get(room) else {
                return;
            };
            let clients = self.clients.read().await;
            members
                .iter()
                .filter(|id| Some(**id) != except)
                .filter_map(|id| clients.get(id).map(|c| c.sender.clone()))
                .collect()
        };

        for sender in senders {
            let _ = sender.send(event.clone()).await;
        }
    }

    /// Number of registered connections.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Number of occupied rooms.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}
