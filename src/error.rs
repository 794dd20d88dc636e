//! Error types for Climatizar
//!
//! This module defines all error types used throughout the library.

use thiserror::Error;

/// Result type alias for Climatizar operations
pub type Result<T> = std::result::Result<T, ClimatizarError>;

/// Error type for all Climatizar operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClimatizarError {
    /// No air conditioner is provisioned for the room
    #[error("Unknown room {room_id}: no air conditioner provisioned")]
    UnknownRoom {
        /// Requested room
        room_id: i64,
    },

    /// The room has no active check-in to bill against
    #[error("Room {room_id} has no active booking")]
    NoActiveBooking {
        /// Requested room
        room_id: i64,
    },

    /// A command parameter failed range or enum validation
    #[error("Invalid parameter: {reason}")]
    InvalidParameter {
        /// Reason for invalidity
        reason: String,
    },

    /// The air conditioner is not tracked by the scheduler
    #[error("Air conditioner {ac_id} is not tracked by the scheduler")]
    NotTracked {
        /// Untracked unit
        ac_id: i64,
    },

    /// A durable-store append or amendment failed
    #[error("Store persist failed: {reason}")]
    StorePersist {
        /// Underlying failure description
        reason: String,
    },
}

impl ClimatizarError {
    /// Stable machine-readable code for wire responses
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownRoom { .. } => "unknown-room",
            Self::NoActiveBooking { .. } => "no-active-booking",
            Self::InvalidParameter { .. } => "invalid-parameter",
            Self::NotTracked { .. } => "not-tracked",
            Self::StorePersist { .. } => "store-persist",
        }
    }
}
