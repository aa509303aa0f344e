//! State replication across a room's connections.
//!
//! Every mutation follows the same shape: apply it to the room under
//! its entry lock, clone the authoritative identity list, drop the
//! guard, then fan the full state out. No diffs - at twelve seats the
//! simplicity is worth more than the bandwidth.

use std::sync::Arc;

use chrono::Utc;

use bloodbond_domain::{
    ConnectionId, DomainError, PlayerIdentity, RevealKind, Room, RoomId, SeatId,
};
use bloodbond_shared::{AllocationMap, ServerMessage};

use crate::api::connections::ConnectionManager;
use crate::rooms::RoomRepository;

/// Applies and broadcasts room mutations.
#[derive(Clone)]
pub struct StateReplicator {
    rooms: Arc<RoomRepository>,
    connections: Arc<ConnectionManager>,
}

impl StateReplicator {
    pub fn new(rooms: Arc<RoomRepository>, connections: Arc<ConnectionManager>) -> Self {
        Self { rooms, connections }
    }

    /// Authoritative last-writer-wins replacement from a privileged
    /// sender. The originator already holds this state, so it is the
    /// one connection left out of the broadcast. Two concurrent
    /// replacements race silently; last write wins (documented
    /// limitation).
    pub async fn replace_state(
        &self,
        origin: ConnectionId,
        room_id: &RoomId,
        identities: Vec<PlayerIdentity>,
    ) -> Result<(), DomainError> {
        let (phase, identities) = self.rooms.with_room(room_id, |room| {
            room.replace_identities(identities, Utc::now());
            Ok((room.phase, room.identities.clone()))
        })?;
        self.connections
            .broadcast_to_room_except(
                room_id,
                origin,
                ServerMessage::StateUpdated { phase, identities },
            )
            .await;
        tracing::debug!(room_id = %room_id, "State replaced");
        Ok(())
    }

    /// Append a reveal and converge every view, sender included. A
    /// seat already at the cap absorbs the call without a broadcast.
    pub async fn append_reveal(
        &self,
        room_id: &RoomId,
        seat: SeatId,
        kind: RevealKind,
    ) -> Result<(), DomainError> {
        let update = self.rooms.with_room(room_id, |room| {
            let changed = room.append_reveal(seat, kind, Utc::now())?;
            Ok(changed.then(|| (room.phase, room.identities.clone())))
        })?;
        if let Some((phase, identities)) = update {
            self.connections
                .broadcast_to_room(room_id, ServerMessage::StateUpdated { phase, identities })
                .await;
            tracing::debug!(room_id = %room_id, seat_id = %seat, reveal = ?kind, "Reveal appended");
        }
        Ok(())
    }

    /// Set a seat's display name and converge every view.
    pub async fn update_display_name(
        &self,
        room_id: &RoomId,
        seat: SeatId,
        name: String,
    ) -> Result<(), DomainError> {
        let (phase, identities) = self.rooms.with_room(room_id, |room| {
            room.set_display_name(seat, name, Utc::now())?;
            Ok((room.phase, room.identities.clone()))
        })?;
        self.connections
            .broadcast_to_room(room_id, ServerMessage::StateUpdated { phase, identities })
            .await;
        tracing::debug!(room_id = %room_id, seat_id = %seat, "Display name updated");
        Ok(())
    }

    /// Commit the one-shot secret-card distribution and broadcast both
    /// the updated state and the receipt. The receipt goes to every
    /// connection in the room, card values included - preserved as
    /// observed behavior, see DESIGN.md.
    pub async fn distribute_secret_cards(
        &self,
        room_id: &RoomId,
        acting_seat: SeatId,
        allocations: AllocationMap,
    ) -> Result<(), DomainError> {
        let (phase, identities) = self.rooms.with_room(room_id, |room| {
            room.distribute_secret_cards(acting_seat, &allocations, Utc::now())?;
            Ok((room.phase, room.identities.clone()))
        })?;
        self.connections
            .broadcast_to_room(room_id, ServerMessage::StateUpdated { phase, identities })
            .await;
        self.connections
            .broadcast_to_room(
                room_id,
                ServerMessage::DistributionReceipt {
                    acting_seat_id: acting_seat,
                    allocation_map: allocations,
                },
            )
            .await;
        tracing::info!(room_id = %room_id, acting_seat = %acting_seat, "Secret cards distributed");
        Ok(())
    }

    /// Redraw identities and push the fresh state to all subscribers.
    pub async fn restart(&self, room_id: &RoomId) -> Result<Room, DomainError> {
        let room = self.rooms.restart(room_id)?;
        self.connections
            .broadcast_to_room(
                room_id,
                ServerMessage::StateUpdated {
                    phase: room.phase,
                    identities: room.identities.clone(),
                },
            )
            .await;
        tracing::info!(room_id = %room_id, "Session restarted");
        Ok(room)
    }
}
