use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::debug;
use uuid::Uuid;

use kindred_types::events::ChannelEvent;
use kindred_types::models::RoomId;

/// Tracks live connections and the rooms they joined.
#[derive(Clone, Default)]
pub struct Rooms {
    inner: Arc<RoomsInner>,
}

#[derive(Default)]
struct RoomsInner {
    /// Outbound queue per connection: conn_id -> sender
    connections: RwLock<HashMap<Uuid, mpsc::UnboundedSender<ChannelEvent>>>,

    /// Room membership: room -> conn_ids
    members: RwLock<HashMap<RoomId, HashSet<Uuid>>>,
}

impl Rooms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection. Returns (conn_id, receiver of room events).
    pub async fn connect(&self) -> (Uuid, mpsc::UnboundedReceiver<ChannelEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.connections.write().await.insert(conn_id, tx);
        (conn_id, rx)
    }

    /// Add a connection to a room. Joining twice is harmless.
    pub async fn join(&self, conn_id: Uuid, room: RoomId) {
        let mut members = self.inner.members.write().await;
        if members.entry(room.clone()).or_default().insert(conn_id) {
            debug!("{} joined room {}", conn_id, room);
        }
    }

    /// Queue an event for every member of a room. Returns how many members got it.
    pub async fn broadcast(&self, room: &RoomId, event: ChannelEvent) -> usize {
        let targets: Vec<Uuid> = match self.inner.members.read().await.get(room) {
            Some(members) => members.iter().copied().collect(),
            None => return 0,
        };

        let connections = self.inner.connections.read().await;
        targets
            .iter()
            .filter_map(|conn_id| connections.get(conn_id))
            .filter(|tx| tx.send(event.clone()).is_ok())
            .count()
    }

    /// Forget a connection and leave every room it joined. Empty rooms are dropped.
    pub async fn disconnect(&self, conn_id: Uuid) {
        self.inner.connections.write().await.remove(&conn_id);

        let mut members = self.inner.members.write().await;
        members.retain(|room, conns| {
            if conns.remove(&conn_id) {
                debug!("{} left room {}", conn_id, room);
            }
            !conns.is_empty()
        });
    }

    pub async fn room_size(&self, room: &RoomId) -> usize {
        self.inner
            .members
            .read()
            .await
            .get(room)
            .map_or(0, HashSet::len)
    }

    pub async fn room_count(&self) -> usize {
        self.inner.members.read().await.len()
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.connections.read().await.len()
    }
}
