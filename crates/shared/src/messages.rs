//! WebSocket message types for Engine-Player communication.
//!
//! The `type` tag values and field names below are the stable wire
//! contract; renaming any of them breaks deployed clients.
//!
//! ## Versioning Policy
//!
//! - New variants can be added at the end (forward compatible)
//! - Removing or renaming variants is a breaking change

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use bloodbond_domain::{Phase, PlayerIdentity, RevealKind, RoomId, SeatId, SecretCard};

/// Seat -> card assignment submitted by the neutral seat. `None`
/// entries are explicit "no card" markers and count toward neither
/// tally.
pub type AllocationMap = BTreeMap<SeatId, Option<SecretCard>>;

// =============================================================================
// Client Messages (Player -> Engine)
// =============================================================================

/// Messages from client (Player or Host) to server (Engine).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Bind this connection to a (room, seat) pair. Seat id 0 is the
    /// reserved host binding: it subscribes without occupying a seat.
    #[serde(rename_all = "camelCase")]
    Join { room_id: RoomId, seat_id: u8 },
    /// Authoritative full replacement of the room's identity list
    /// (host tool). Last writer wins; no merge is attempted.
    #[serde(rename_all = "camelCase")]
    ReplaceState {
        room_id: RoomId,
        identities: Vec<PlayerIdentity>,
    },
    /// A seat-scoped game action, dispatched by kind.
    #[serde(rename_all = "camelCase")]
    Action {
        room_id: RoomId,
        seat_id: SeatId,
        #[serde(flatten)]
        action: PlayerAction,
    },
    /// Heartbeat ping.
    Ping,
}

/// The action sub-protocol carried inside [`ClientMessage::Action`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "camelCase")]
pub enum PlayerAction {
    /// Append one faction clue to the acting seat (capped at 3).
    AppendReveal { reveal: RevealKind },
    /// Set the acting seat's table name.
    UpdateDisplayName { name: String },
    /// One-shot secret-card distribution by the neutral seat.
    DistributeSecretCards { allocations: AllocationMap },
}

// =============================================================================
// Server Messages (Engine -> Player)
// =============================================================================

/// Messages from server (Engine) to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Private room snapshot, sent only to a connection that just
    /// joined.
    #[serde(rename_all = "camelCase")]
    Snapshot {
        room_id: RoomId,
        declared_count: u8,
        connected_seat_ids: Vec<SeatId>,
        phase: Phase,
        identities: Vec<PlayerIdentity>,
    },
    /// A player seat came online (never emitted for the host binding).
    #[serde(rename_all = "camelCase")]
    SeatJoined {
        seat_id: SeatId,
        connected_seat_ids: Vec<SeatId>,
    },
    /// A player seat went offline.
    #[serde(rename_all = "camelCase")]
    SeatLeft {
        seat_id: SeatId,
        connected_seat_ids: Vec<SeatId>,
    },
    /// Presence flip for one seat.
    #[serde(rename_all = "camelCase")]
    PresenceChanged { seat_id: SeatId, is_online: bool },
    /// Full authoritative state after any mutation. No diffs: at this
    /// table size replication simplicity beats bandwidth.
    #[serde(rename_all = "camelCase")]
    StateUpdated {
        phase: Phase,
        identities: Vec<PlayerIdentity>,
    },
    /// Receipt for a committed secret-card distribution. Currently
    /// visible to every connection in the room, real/fake values
    /// included - preserved as observed, see DESIGN.md.
    #[serde(rename_all = "camelCase")]
    DistributionReceipt {
        acting_seat_id: SeatId,
        allocation_map: AllocationMap,
    },
    /// Heartbeat reply.
    Pong,
    /// Handler-level fault surfaced to the offending connection only.
    Error { message: String },
}
