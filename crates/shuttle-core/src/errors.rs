//! Registry error types.
//!
//! Every variant is returned synchronously to the caller of the registry and
//! is never retried. Transport failures live in the server crate; a dead
//! subscriber never fails a registry operation.

use std::fmt;

use thiserror::Error;

/// Kind of tracked entity, used to qualify error messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// A driver with a position.
    Driver,
    /// A passenger without a position.
    Passenger,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Driver => write!(f, "driver"),
            Self::Passenger => write!(f, "passenger"),
        }
    }
}

/// Which half of a position failed validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Coordinate {
    /// Must lie in `[-90, 90]`.
    Latitude,
    /// Must lie in `[-180, 180]`.
    Longitude,
}

impl Coordinate {
    /// Inclusive bound magnitude for this coordinate.
    pub const fn limit(self) -> f64 {
        match self {
            Self::Latitude => 90.0,
            Self::Longitude => 180.0,
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latitude => write!(f, "latitude"),
            Self::Longitude => write!(f, "longitude"),
        }
    }
}

/// Errors returned by [`EntityRegistry`](crate::EntityRegistry) operations.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum RegistryError {
    /// The identifier was empty.
    #[error("{kind} ID cannot be empty")]
    InvalidId {
        /// Entity the caller tried to address.
        kind: EntityKind,
    },

    /// An entity with this identifier already exists.
    #[error("{kind} already exists: {id}")]
    DuplicateId {
        /// Entity kind.
        kind: EntityKind,
        /// Offending identifier.
        id: String,
    },

    /// No entity with this identifier exists.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Entity kind.
        kind: EntityKind,
        /// Missing identifier.
        id: String,
    },

    /// A coordinate was outside its valid range. The update was rejected as a whole.
    #[error("invalid {coordinate} {value}: must be between -{limit} and {limit}", limit = .coordinate.limit())]
    OutOfRange {
        /// Coordinate that failed.
        coordinate: Coordinate,
        /// Rejected value.
        value: f64,
    },
}

impl RegistryError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidId { .. } => "INVALID_ID",
            Self::DuplicateId { .. } => "DUPLICATE_ID",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::OutOfRange { .. } => "OUT_OF_RANGE",
        }
    }
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
