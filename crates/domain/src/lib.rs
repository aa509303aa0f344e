//! Bloodbond domain - the game rules with no I/O attached.
//!
//! Everything here is synchronous and deterministic given an injected
//! RNG: identity assignment, the room aggregate and its mutation
//! invariants (reveal cap, one-shot secret-card allocation, restart
//! semantics), and the shared error taxonomy.

pub mod assign;
pub mod error;
pub mod identity;
pub mod ids;
pub mod room;

pub use assign::assign_identities;
pub use error::DomainError;
pub use identity::{
    DisplayedColor, Faction, PlayerIdentity, RevealKind, SecretCard, MAX_REVEALS,
};
pub use ids::{AccessToken, ConnectionId, RoomId, SeatId};
pub use room::{expected_allocation, Phase, Room, MAX_PLAYERS, MIN_PLAYERS};
