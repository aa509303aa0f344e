//! In-memory room repository with inactivity expiry.
//!
//! Rooms live in a concurrent map; every mutation runs to completion
//! while holding the room's entry, so mutations within one room are
//! serialized and rooms stay independent of each other. Nothing here
//! survives a process restart (by scope).

use chrono::{Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;

use bloodbond_domain::{DomainError, Room, RoomId};

/// Rooms idle longer than this are deleted.
pub const INACTIVITY_WINDOW_MINUTES: i64 = 30;

/// Period of the background sweep.
pub const SWEEP_INTERVAL_SECS: u64 = 5 * 60;

/// Keyed store of room aggregates.
pub struct RoomRepository {
    rooms: DashMap<RoomId, Room>,
}

impl RoomRepository {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    /// Create a room with freshly assigned identities.
    pub fn create(&self, declared_count: u8) -> Result<RoomId, DomainError> {
        let mut rng = rand::thread_rng();
        let id = RoomId::generate(&mut rng);
        let room = Room::new(id.clone(), declared_count, &mut rng, Utc::now())?;
        self.rooms.insert(id.clone(), room);
        tracing::info!(room_id = %id, player_count = declared_count, "Room created");
        Ok(id)
    }

    /// Clone a point-in-time copy of a room.
    pub fn snapshot(&self, id: &RoomId) -> Result<Room, DomainError> {
        self.rooms
            .get(id)
            .map(|r| r.clone())
            .ok_or_else(|| DomainError::not_found(id.as_str()))
    }

    pub fn contains(&self, id: &RoomId) -> bool {
        self.rooms.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Run a closure against a room under its entry lock. The closure
    /// must not block; broadcasts happen after the guard is dropped.
    pub fn with_room<T>(
        &self,
        id: &RoomId,
        f: impl FnOnce(&mut Room) -> Result<T, DomainError>,
    ) -> Result<T, DomainError> {
        let mut entry = self
            .rooms
            .get_mut(id)
            .ok_or_else(|| DomainError::not_found(id.as_str()))?;
        f(entry.value_mut())
    }

    pub fn touch(&self, id: &RoomId) -> Result<(), DomainError> {
        self.with_room(id, |room| {
            room.touch(Utc::now());
            Ok(())
        })
    }

    /// Redraw identities in place, preserving display names by seat.
    pub fn restart(&self, id: &RoomId) -> Result<Room, DomainError> {
        self.with_room(id, |room| {
            room.restart(&mut rand::thread_rng(), Utc::now())?;
            Ok(room.clone())
        })
    }

    /// Idempotent delete-if-stale for a single room. Used by the
    /// one-shot timer armed at creation; racing the periodic sweep is
    /// harmless.
    pub fn remove_if_expired(&self, id: &RoomId) -> bool {
        let now = Utc::now();
        let window = Duration::minutes(INACTIVITY_WINDOW_MINUTES);
        let removed = self
            .rooms
            .remove_if(id, |_, room| room.is_expired(now, window))
            .is_some();
        if removed {
            tracing::info!(room_id = %id, "Expired room removed");
        }
        removed
    }

    /// Remove every room past the inactivity window. Returns how many
    /// were dropped.
    pub fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let window = Duration::minutes(INACTIVITY_WINDOW_MINUTES);
        let before = self.rooms.len();
        self.rooms.retain(|_, room| !room.is_expired(now, window));
        let removed = before - self.rooms.len();
        if removed > 0 {
            tracing::info!(removed, "Swept expired rooms");
        }
        removed
    }
}

impl Default for RoomRepository {
    fn default() -> Self {
        Self::new()
    }
}

/// Arm the one-shot expiry timer for a freshly created room. Fires
/// once after the inactivity window; activity since creation makes the
/// delete a no-op and leaves the room to the periodic sweep.
pub fn arm_expiry_timer(repo: Arc<RoomRepository>, id: RoomId) {
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_secs(
            INACTIVITY_WINDOW_MINUTES as u64 * 60,
        ))
        .await;
        repo.remove_if_expired(&id);
    });
}
