//! # shuttle-core
//!
//! Foundation types for the shuttle tracker.
//!
//! - [`EntityRegistry`]: authoritative driver and passenger maps, each behind
//!   its own lock
//! - [`Snapshot`]: immutable value copy of every driver position
//! - [`SnapshotQueue`]: bounded, non-blocking hand-off from the registry to the
//!   broadcast dispatcher
//! - [`RegistryError`]: synchronous validation and lookup failures

#![deny(unsafe_code)]

pub mod errors;
pub mod queue;
pub mod registry;
pub mod types;

pub use errors::{Coordinate, EntityKind, RegistryError, Result};
pub use queue::SnapshotQueue;
pub use registry::EntityRegistry;
pub use types::{Driver, LocationUpdate, Passenger, Position, Snapshot};
