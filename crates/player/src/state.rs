//! Local replica of the engine's room state.
//!
//! The engine is authoritative; this mirror only ever changes by
//! applying server events in arrival order. Rendering layers read it,
//! they never write it.

use bloodbond_domain::{Phase, PlayerIdentity, RoomId, SeatId};
use bloodbond_shared::ServerMessage;

/// Which view this replica renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerSeat {
    /// The coordinator view (wire seat id 0): sees the whole table.
    Host,
    /// A single player's private view.
    Player(SeatId),
}

impl ViewerSeat {
    pub fn wire_seat_id(self) -> u8 {
        match self {
            Self::Host => SeatId::HOST_SENTINEL,
            Self::Player(seat) => seat.value(),
        }
    }
}

/// Connection lifecycle as seen by the replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

/// Mirrored room state plus the local connection status.
#[derive(Debug, Clone, Default)]
pub struct ReplicaState {
    pub room_id: Option<RoomId>,
    pub viewer: Option<ViewerSeat>,
    pub declared_count: Option<u8>,
    pub phase: Option<Phase>,
    pub identities: Vec<PlayerIdentity>,
    pub connected_seat_ids: Vec<SeatId>,
    pub connection: ConnectionStatus,
    /// Last error event from the engine, cleared by the next snapshot.
    pub last_error: Option<String>,
}

impl ReplicaState {
    /// Bind this replica to a room before the first join completes.
    pub fn bind(&mut self, room_id: RoomId, viewer: ViewerSeat) {
        self.room_id = Some(room_id);
        self.viewer = Some(viewer);
    }

    pub fn set_connection(&mut self, status: ConnectionStatus) {
        self.connection = status;
    }

    /// The identity this viewer is allowed to see in full, if any.
    pub fn own_identity(&self) -> Option<&PlayerIdentity> {
        match self.viewer? {
            ViewerSeat::Host => None,
            ViewerSeat::Player(seat) => self.identities.iter().find(|i| i.seat_id == seat),
        }
    }

    /// Apply one server event. Snapshots replace the mirror wholesale;
    /// incremental events patch it. Unknown-room errors leave the
    /// mirror untouched so a stale view is never half-cleared.
    pub fn apply(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::Snapshot {
                room_id,
                declared_count,
                connected_seat_ids,
                phase,
                identities,
            } => {
                self.room_id = Some(room_id);
                self.declared_count = Some(declared_count);
                self.connected_seat_ids = connected_seat_ids;
                self.phase = Some(phase);
                self.identities = identities;
                self.last_error = None;
            }
            ServerMessage::StateUpdated { phase, identities } => {
                self.phase = Some(phase);
                self.identities = identities;
            }
            ServerMessage::SeatJoined {
                connected_seat_ids, ..
            }
            | ServerMessage::SeatLeft {
                connected_seat_ids, ..
            } => {
                self.connected_seat_ids = connected_seat_ids;
            }
            ServerMessage::PresenceChanged { seat_id, is_online } => {
                if let Some(identity) =
                    self.identities.iter_mut().find(|i| i.seat_id == seat_id)
                {
                    identity.is_online = is_online;
                }
            }
            ServerMessage::DistributionReceipt { allocation_map, .. } => {
                for (seat_id, card) in allocation_map {
                    if let Some(card) = card {
                        if let Some(identity) =
                            self.identities.iter_mut().find(|i| i.seat_id == seat_id)
                        {
                            identity.has_secret_card = Some(card);
                        }
                    }
                }
            }
            ServerMessage::Error { message } => {
                self.last_error = Some(message);
            }
            ServerMessage::Pong => {}
        }
    }

    /// Drop everything, including the room binding. Used when the user
    /// leaves a session for good, not on transient disconnects.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
