//! Bloodbond shared - wire protocol types for Engine and Player.
//!
//! Both sides of the live channel and the HTTP surface speak the types
//! in this crate; neither side depends on the other's internals.

pub mod messages;
pub mod requests;
pub mod responses;

pub use messages::{AllocationMap, ClientMessage, PlayerAction, ServerMessage};
pub use requests::CreateRoomRequest;
pub use responses::{CreateRoomResponse, HealthResponse, RoomSummary, StartResponse};
