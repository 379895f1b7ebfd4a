use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{
    mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    RwLock,
};
use uuid::Uuid;

pub mod events;
pub mod handlers;
pub mod message_types;
pub mod rate_limit;

/// Unique identifier for one live WebSocket connection.
///
/// Assigned at upgrade time; used for precise registry cleanup and as the
/// rate-limit bucket key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

struct Subscriber {
    connection_id: ConnectionId,
    user_id: Uuid,
    sender: UnboundedSender<String>,
}

/// Process-local index of live connections.
///
/// Two views over the same set of sockets: room id -> subscribed
/// connections (the multicast groups) and user id -> every live connection
/// of that user (the private channels). Both are derived, transient state;
/// the durable participant sets live in Postgres.
///
/// Dead senders are cleaned up on the next broadcast that touches them, and
/// precisely on disconnect via `unregister`.
#[derive(Default, Clone)]
pub struct ConnectionRegistry {
    rooms: Arc<RwLock<HashMap<Uuid, Vec<Subscriber>>>>,
    users: Arc<RwLock<HashMap<Uuid, Vec<Subscriber>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection's private channel. Returns the receiving end
    /// of the connection's outbound queue.
    pub async fn register(
        &self,
        user_id: Uuid,
        connection_id: ConnectionId,
    ) -> (UnboundedSender<String>, UnboundedReceiver<String>) {
        let (tx, rx) = unbounded_channel();
        let mut guard = self.users.write().await;
        guard.entry(user_id).or_default().push(Subscriber {
            connection_id,
            user_id,
            sender: tx.clone(),
        });
        (tx, rx)
    }

    /// Remove a connection everywhere: its private channel and every room
    /// it subscribed to. Returns the room ids it was evicted from so the
    /// caller can emit participant-left events.
    pub async fn unregister(&self, user_id: Uuid, connection_id: ConnectionId) -> Vec<Uuid> {
        {
            let mut guard = self.users.write().await;
            if let Some(list) = guard.get_mut(&user_id) {
                list.retain(|s| s.connection_id != connection_id);
                if list.is_empty() {
                    guard.remove(&user_id);
                }
            }
        }

        let mut left = Vec::new();
        let mut guard = self.rooms.write().await;
        guard.retain(|room_id, subscribers| {
            let before = subscribers.len();
            subscribers.retain(|s| s.connection_id != connection_id);
            if subscribers.len() != before {
                left.push(*room_id);
            }
            !subscribers.is_empty()
        });
        left
    }

    pub async fn join_room(
        &self,
        room_id: Uuid,
        connection_id: ConnectionId,
        user_id: Uuid,
        sender: UnboundedSender<String>,
    ) {
        let mut guard = self.rooms.write().await;
        let subscribers = guard.entry(room_id).or_default();
        // A reconnect may reuse the multicast slot; never double-subscribe.
        subscribers.retain(|s| s.connection_id != connection_id);
        subscribers.push(Subscriber {
            connection_id,
            user_id,
            sender,
        });
    }

    pub async fn leave_room(&self, room_id: Uuid, connection_id: ConnectionId) {
        let mut guard = self.rooms.write().await;
        if let Some(subscribers) = guard.get_mut(&room_id) {
            subscribers.retain(|s| s.connection_id != connection_id);
            if subscribers.is_empty() {
                guard.remove(&room_id);
            }
        }
    }

    /// Fan a payload out to every live member of a room, optionally skipping
    /// one connection. Dead senders are dropped as a side effect.
    pub async fn broadcast_room(
        &self,
        room_id: Uuid,
        payload: &str,
        exclude: Option<ConnectionId>,
    ) {
        let mut guard = self.rooms.write().await;
        if let Some(subscribers) = guard.get_mut(&room_id) {
            subscribers.retain(|s| {
                if Some(s.connection_id) == exclude {
                    return true;
                }
                s.sender.send(payload.to_string()).is_ok()
            });
            if subscribers.is_empty() {
                guard.remove(&room_id);
            }
        }
    }

    /// Deliver to every live connection of one user. Returns true if at
    /// least one connection took the payload.
    pub async fn send_to_user(&self, user_id: Uuid, payload: &str) -> bool {
        let mut guard = self.users.write().await;
        let mut delivered = false;
        if let Some(list) = guard.get_mut(&user_id) {
            list.retain(|s| {
                let ok = s.sender.send(payload.to_string()).is_ok();
                delivered |= ok;
                ok
            });
            if list.is_empty() {
                guard.remove(&user_id);
            }
        }
        delivered
    }

    /// Broadcast to every live connection of every user.
    pub async fn broadcast_all(&self, payload: &str) {
        let mut guard = self.users.write().await;
        guard.retain(|_, list| {
            list.retain(|s| s.sender.send(payload.to_string()).is_ok());
            !list.is_empty()
        });
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.users.read().await.contains_key(&user_id)
    }

    /// User ids with at least one connection currently in the room.
    pub async fn users_in_room(&self, room_id: Uuid) -> HashSet<Uuid> {
        let guard = self.rooms.read().await;
        guard
            .get(&room_id)
            .map(|subs| subs.iter().map(|s| s.user_id).collect())
            .unwrap_or_default()
    }

    /// Tear down a room's multicast group entirely (room deletion).
    pub async fn drop_room(&self, room_id: Uuid) {
        self.rooms.write().await.remove(&room_id);
    }

    pub async fn room_connection_count(&self, room_id: Uuid) -> usize {
        let guard = self.rooms.read().await;
        guard.get(&room_id).map(|v| v.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn room_broadcast_reaches_members_and_skips_excluded() {
        let registry = ConnectionRegistry::new();
        let room = Uuid::new_v4();
        let (user_a, user_b) = (Uuid::new_v4(), Uuid::new_v4());
        let (conn_a, conn_b) = (ConnectionId::new(), ConnectionId::new());

        let (tx_a, mut rx_a) = registry.register(user_a, conn_a).await;
        let (tx_b, mut rx_b) = registry.register(user_b, conn_b).await;
        registry.join_room(room, conn_a, user_a, tx_a).await;
        registry.join_room(room, conn_b, user_b, tx_b).await;

        registry.broadcast_room(room, "hello", None).await;
        assert_eq!(rx_a.recv().await.unwrap(), "hello");
        assert_eq!(rx_b.recv().await.unwrap(), "hello");

        registry.broadcast_room(room, "not for a", Some(conn_a)).await;
        assert_eq!(rx_b.recv().await.unwrap(), "not for a");
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn unregister_reports_rooms_left_and_drops_private_channel() {
        let registry = ConnectionRegistry::new();
        let room = Uuid::new_v4();
        let user = Uuid::new_v4();
        let conn = ConnectionId::new();

        let (tx, _rx) = registry.register(user, conn).await;
        registry.join_room(room, conn, user, tx).await;
        assert!(registry.is_online(user).await);
        assert_eq!(registry.room_connection_count(room).await, 1);

        let left = registry.unregister(user, conn).await;
        assert_eq!(left, vec![room]);
        assert!(!registry.is_online(user).await);
        assert_eq!(registry.room_connection_count(room).await, 0);
    }

    #[tokio::test]
    async fn send_to_user_reports_delivery() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();
        let conn = ConnectionId::new();
        let (_tx, mut rx) = registry.register(user, conn).await;

        assert!(registry.send_to_user(user, "ping").await);
        assert_eq!(rx.recv().await.unwrap(), "ping");
        assert!(!registry.send_to_user(Uuid::new_v4(), "nobody home").await);
    }

    #[tokio::test]
    async fn dead_senders_are_cleaned_up_on_broadcast() {
        let registry = ConnectionRegistry::new();
        let room = Uuid::new_v4();
        let user = Uuid::new_v4();
        let conn = ConnectionId::new();

        let (tx, rx) = registry.register(user, conn).await;
        registry.join_room(room, conn, user, tx).await;
        drop(rx);

        registry.broadcast_room(room, "anyone?", None).await;
        assert_eq!(registry.room_connection_count(room).await, 0);
    }
}
