//! Response DTOs for the HTTP surface.

use serde::{Deserialize, Serialize};

use bloodbond_domain::{Phase, PlayerIdentity, RoomId, SeatId};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomResponse {
    pub room_id: RoomId,
}

/// One-shot room summary. `identities` is populated once the session
/// has been started at least once.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub room_id: RoomId,
    pub declared_count: u8,
    pub connected_seat_ids: Vec<SeatId>,
    pub phase: Phase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identities: Option<Vec<PlayerIdentity>>,
}

/// Returned by both start and restart; always reflects the current
/// authoritative identity list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub room_id: RoomId,
    pub phase: Phase,
    pub identities: Vec<PlayerIdentity>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub active_room_count: usize,
    pub active_connection_count: usize,
    pub uptime_seconds: i64,
}
