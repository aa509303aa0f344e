//! Application state and composition.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::api::connections::ConnectionManager;
use crate::replication::StateReplicator;
use crate::rooms::RoomRepository;

/// Main application state.
///
/// Holds the room repository, the connection manager and the
/// replicator that ties them together. Passed to HTTP/WebSocket
/// handlers via Axum state.
pub struct App {
    pub rooms: Arc<RoomRepository>,
    pub connections: Arc<ConnectionManager>,
    pub replicator: StateReplicator,
    pub started_at: DateTime<Utc>,
}

impl App {
    pub fn new() -> Self {
        let rooms = Arc::new(RoomRepository::new());
        let connections = Arc::new(ConnectionManager::new());
        let replicator = StateReplicator::new(rooms.clone(), connections.clone());
        Self {
            rooms,
            connections,
            replicator,
            started_at: Utc::now(),
        }
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}
