//! Unified error types for the domain layer.
//!
//! Every handler-level fault is local and recoverable: invalid input is
//! rejected before any mutation and the room is left untouched.

use thiserror::Error;

/// Unified error type for domain operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Session creation or restart outside the supported table size.
    #[error("Player count must be between 6 and 12, got {0}")]
    InvalidPlayerCount(u8),

    /// Unknown room id.
    #[error("Room not found: {0}")]
    NotFound(String),

    /// Unknown seat id within an existing room.
    #[error("Seat not found: {0}")]
    SeatNotFound(u8),

    /// Secret-card distribution attempted by a seat that does not hold
    /// the neutral role.
    #[error("Seat {0} does not hold the neutral role")]
    NotNeutralSeat(u8),

    /// Secret-card distribution already committed for this room.
    #[error("Secret cards have already been distributed")]
    AlreadyDistributed,

    /// Submitted allocation tally does not match the fixed table for
    /// the declared room size.
    #[error(
        "Allocation mismatch: expected {expected_real} real / {expected_fake} fake, \
         got {got_real} real / {got_fake} fake"
    )]
    AllocationCountMismatch {
        expected_real: u8,
        expected_fake: u8,
        got_real: u8,
        got_fake: u8,
    },
}

impl DomainError {
    pub fn not_found(room_id: impl Into<String>) -> Self {
        Self::NotFound(room_id.into())
    }
}
