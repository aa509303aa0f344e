//! Connection management for WebSocket clients.
//!
//! Tracks live connections and their (room, seat) bindings. The host
//! is a distinct binding variant, not a seat: it subscribes to room
//! events without ever occupying a slot in `connected_seats`.

use std::collections::HashMap;

use tokio::sync::{mpsc, RwLock};

use bloodbond_domain::{ConnectionId, RoomId, SeatId};
use bloodbond_shared::ServerMessage;

/// What a connection is bound to within its room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeatBinding {
    /// The coordinator connection (wire seat id 0).
    Host,
    /// A real player seat.
    Player(SeatId),
}

impl SeatBinding {
    /// Map the reserved wire value to the host variant.
    pub fn from_wire(seat_id: u8) -> Self {
        if seat_id == SeatId::HOST_SENTINEL {
            Self::Host
        } else {
            Self::Player(SeatId::new(seat_id))
        }
    }

    pub fn player_seat(self) -> Option<SeatId> {
        match self {
            Self::Host => None,
            Self::Player(seat) => Some(seat),
        }
    }
}

/// Information about a connected client.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub connection_id: ConnectionId,
    /// The room this connection has joined (if any).
    pub room_id: Option<RoomId>,
    pub binding: Option<SeatBinding>,
}

/// Manages all active WebSocket connections.
pub struct ConnectionManager {
    /// Map of connection_id -> (ConnectionInfo, sender channel)
    connections: RwLock<HashMap<ConnectionId, (ConnectionInfo, mpsc::Sender<ServerMessage>)>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new connection before it has joined any room.
    pub async fn register(&self, connection_id: ConnectionId, sender: mpsc::Sender<ServerMessage>) {
        let info = ConnectionInfo {
            connection_id,
            room_id: None,
            binding: None,
        };
        let mut connections = self.connections.write().await;
        connections.insert(connection_id, (info, sender));
        tracing::debug!(connection_id = %connection_id, "Connection registered");
    }

    /// Unregister a connection. Idempotent.
    pub async fn unregister(&self, connection_id: ConnectionId) {
        let mut connections = self.connections.write().await;
        if connections.remove(&connection_id).is_some() {
            tracing::debug!(connection_id = %connection_id, "Connection unregistered");
        }
    }

    pub async fn get(&self, connection_id: ConnectionId) -> Option<ConnectionInfo> {
        let connections = self.connections.read().await;
        connections.get(&connection_id).map(|(info, _)| info.clone())
    }

    pub async fn count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Bind a connection to a (room, seat-or-host) pair. Re-binding is
    /// allowed: a reconnecting seat simply moves to its new connection.
    pub async fn bind(&self, connection_id: ConnectionId, room_id: RoomId, binding: SeatBinding) {
        let mut connections = self.connections.write().await;
        if let Some((info, _)) = connections.get_mut(&connection_id) {
            info.room_id = Some(room_id.clone());
            info.binding = Some(binding);
            tracing::info!(
                connection_id = %connection_id,
                room_id = %room_id,
                binding = ?binding,
                "Connection joined room"
            );
        }
    }

    /// Send to one connection.
    pub async fn send_to(&self, connection_id: ConnectionId, message: ServerMessage) {
        let connections = self.connections.read().await;
        if let Some((_, sender)) = connections.get(&connection_id) {
            if let Err(e) = sender.try_send(message) {
                tracing::warn!(
                    connection_id = %connection_id,
                    error = %e,
                    "Failed to send message"
                );
            }
        }
    }

    /// Broadcast to every connection in a room.
    pub async fn broadcast_to_room(&self, room_id: &RoomId, message: ServerMessage) {
        self.broadcast_filtered(room_id, None, message).await;
    }

    /// Broadcast to every connection in a room except one (the
    /// originator of a replace-state mutation).
    pub async fn broadcast_to_room_except(
        &self,
        room_id: &RoomId,
        exclude: ConnectionId,
        message: ServerMessage,
    ) {
        self.broadcast_filtered(room_id, Some(exclude), message).await;
    }

    async fn broadcast_filtered(
        &self,
        room_id: &RoomId,
        exclude: Option<ConnectionId>,
        message: ServerMessage,
    ) {
        let connections = self.connections.read().await;
        for (info, sender) in connections.values() {
            if info.room_id.as_ref() != Some(room_id) {
                continue;
            }
            if exclude == Some(info.connection_id) {
                continue;
            }
            if let Err(e) = sender.try_send(message.clone()) {
                tracing::warn!(
                    connection_id = %info.connection_id,
                    error = %e,
                    "Failed to broadcast message"
                );
            }
        }
    }

    /// Find the connection currently bound to a player seat, if any.
    pub async fn connection_for_seat(
        &self,
        room_id: &RoomId,
        seat: SeatId,
    ) -> Option<ConnectionId> {
        let connections = self.connections.read().await;
        connections
            .values()
            .find(|(info, _)| {
                info.room_id.as_ref() == Some(room_id)
                    && info.binding == Some(SeatBinding::Player(seat))
            })
            .map(|(info, _)| info.connection_id)
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (mpsc::Sender<ServerMessage>, mpsc::Receiver<ServerMessage>) {
        mpsc::channel(16)
    }

    #[test]
    fn wire_seat_zero_binds_as_host() {
        assert_eq!(SeatBinding::from_wire(0), SeatBinding::Host);
        assert_eq!(
            SeatBinding::from_wire(4),
            SeatBinding::Player(SeatId::new(4))
        );
        assert_eq!(SeatBinding::Host.player_seat(), None);
    }

    #[tokio::test]
    async fn broadcast_skips_other_rooms_and_the_excluded_connection() {
        let manager = ConnectionManager::new();
        let room_a = RoomId::from("111111");
        let room_b = RoomId::from("222222");

        let (tx1, mut rx1) = channel();
        let (tx2, mut rx2) = channel();
        let (tx3, mut rx3) = channel();
        let (c1, c2, c3) = (ConnectionId::new(), ConnectionId::new(), ConnectionId::new());

        manager.register(c1, tx1).await;
        manager.register(c2, tx2).await;
        manager.register(c3, tx3).await;
        manager.bind(c1, room_a.clone(), SeatBinding::Host).await;
        manager
            .bind(c2, room_a.clone(), SeatBinding::Player(SeatId::new(1)))
            .await;
        manager
            .bind(c3, room_b, SeatBinding::Player(SeatId::new(1)))
            .await;

        manager
            .broadcast_to_room_except(&room_a, c2, ServerMessage::Pong)
            .await;

        assert!(matches!(rx1.try_recv(), Ok(ServerMessage::Pong)));
        assert!(rx2.try_recv().is_err());
        assert!(rx3.try_recv().is_err());
    }

    #[tokio::test]
    async fn rebinding_moves_a_seat_to_its_new_connection() {
        let manager = ConnectionManager::new();
        let room = RoomId::from("333333");
        let seat = SeatId::new(2);

        let (tx1, _rx1) = channel();
        let (tx2, _rx2) = channel();
        let (c1, c2) = (ConnectionId::new(), ConnectionId::new());
        manager.register(c1, tx1).await;
        manager.register(c2, tx2).await;

        manager.bind(c1, room.clone(), SeatBinding::Player(seat)).await;
        assert_eq!(manager.connection_for_seat(&room, seat).await, Some(c1));

        // Reconnect: the seat follows the newest binding once the old
        // connection goes away.
        manager.unregister(c1).await;
        manager.bind(c2, room.clone(), SeatBinding::Player(seat)).await;
        assert_eq!(manager.connection_for_seat(&room, seat).await, Some(c2));
    }

    #[tokio::test]
    async fn unregister_is_idempotent() {
        let manager = ConnectionManager::new();
        let (tx, _rx) = channel();
        let id = ConnectionId::new();
        manager.register(id, tx).await;
        assert_eq!(manager.count().await, 1);
        manager.unregister(id).await;
        manager.unregister(id).await;
        assert_eq!(manager.count().await, 0);
    }
}
