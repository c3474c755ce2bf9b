//! Authoritative driver and passenger state.
//!
//! Drivers and passengers live behind independent locks so passenger churn
//! never contends with location updates. Broadcast snapshots are captured
//! while the driver lock is held, which makes every snapshot consistent with
//! some total order of driver mutations.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::errors::{EntityKind, RegistryError, Result};
use crate::queue::SnapshotQueue;
use crate::types::{Driver, LocationUpdate, Passenger, Position, Snapshot};

#[derive(Debug, Default)]
struct DriverTable {
    entries: BTreeMap<String, Driver>,
    version: u64,
}

impl DriverTable {
    fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.entries.values().cloned().collect(), self.version)
    }
}

/// Shared registry of drivers and passengers.
///
/// Constructed once at startup and shared via `Arc`. All methods take `&self`.
#[derive(Debug)]
pub struct EntityRegistry {
    drivers: Mutex<DriverTable>,
    passengers: Mutex<BTreeMap<String, Passenger>>,
    queue: SnapshotQueue,
}

impl EntityRegistry {
    /// Create an empty registry that publishes snapshots to `queue`.
    pub fn new(queue: SnapshotQueue) -> Self {
        Self {
            drivers: Mutex::new(DriverTable::default()),
            passengers: Mutex::new(BTreeMap::new()),
            queue,
        }
    }

    /// Create an empty registry with a fresh queue of the given capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(SnapshotQueue::new(capacity))
    }

    /// The snapshot queue this registry publishes to.
    pub fn queue(&self) -> &SnapshotQueue {
        &self.queue
    }

    /// Attach a consumer to the snapshot queue.
    pub fn subscribe(&self) -> broadcast::Receiver<Snapshot> {
        self.queue.subscribe()
    }

    // ── Drivers ──

    /// Register a driver at `(0, 0)`.
    ///
    /// Does not broadcast; the new driver appears in the next published snapshot.
    pub fn create_driver(&self, id: &str) -> Result<Driver> {
        require_id(EntityKind::Driver, id)?;
        let mut table = self.drivers.lock();
        if table.entries.contains_key(id) {
            return Err(RegistryError::DuplicateId {
                kind: EntityKind::Driver,
                id: id.to_owned(),
            });
        }
        let driver = Driver::new(id);
        let _ = table.entries.insert(id.to_owned(), driver.clone());
        table.version += 1;
        drop(table);
        info!(driver_id = id, "driver created");
        Ok(driver)
    }

    /// Remove a driver and publish the resulting snapshot.
    pub fn delete_driver(&self, id: &str) -> Result<()> {
        require_id(EntityKind::Driver, id)?;
        let mut table = self.drivers.lock();
        if table.entries.remove(id).is_none() {
            return Err(RegistryError::NotFound {
                kind: EntityKind::Driver,
                id: id.to_owned(),
            });
        }
        table.version += 1;
        let snapshot = table.snapshot();
        let _ = self.queue.publish(snapshot);
        drop(table);
        info!(driver_id = id, "driver deleted");
        Ok(())
    }

    /// Overwrite a driver's position.
    ///
    /// Coordinates are validated before the driver is looked up, so an
    /// out-of-range update for an unknown driver reports `OutOfRange`. A
    /// rejected update leaves the stored position untouched. Does not
    /// broadcast; see [`publish_snapshot`](Self::publish_snapshot).
    pub fn update_location(&self, id: &str, latitude: f64, longitude: f64) -> Result<Driver> {
        let position = Position::new(latitude, longitude)?;
        let mut table = self.drivers.lock();
        let Some(driver) = table.entries.get_mut(id) else {
            return Err(RegistryError::NotFound {
                kind: EntityKind::Driver,
                id: id.to_owned(),
            });
        };
        driver.latitude = position.latitude();
        driver.longitude = position.longitude();
        let updated = driver.clone();
        table.version += 1;
        drop(table);
        debug!(driver_id = id, latitude, longitude, "location updated");
        Ok(updated)
    }

    /// Apply a decoded [`LocationUpdate`].
    pub fn apply(&self, update: &LocationUpdate) -> Result<Driver> {
        self.update_location(&update.id, update.latitude, update.longitude)
    }

    /// Capture a snapshot under the driver lock and enqueue it for broadcast.
    pub fn publish_snapshot(&self) -> Snapshot {
        let table = self.drivers.lock();
        let snapshot = table.snapshot();
        let _ = self.queue.publish(snapshot.clone());
        snapshot
    }

    /// Consistent copy of every driver, without publishing.
    pub fn snapshot(&self) -> Snapshot {
        self.drivers.lock().snapshot()
    }

    /// Look up a single driver.
    pub fn driver(&self, id: &str) -> Option<Driver> {
        self.drivers.lock().entries.get(id).cloned()
    }

    /// Number of registered drivers.
    pub fn driver_count(&self) -> usize {
        self.drivers.lock().entries.len()
    }

    // ── Passengers ──

    /// Register a passenger. Never broadcasts.
    pub fn create_passenger(&self, id: &str) -> Result<Passenger> {
        require_id(EntityKind::Passenger, id)?;
        let mut passengers = self.passengers.lock();
        if passengers.contains_key(id) {
            return Err(RegistryError::DuplicateId {
                kind: EntityKind::Passenger,
                id: id.to_owned(),
            });
        }
        let passenger = Passenger::new(id);
        let _ = passengers.insert(id.to_owned(), passenger.clone());
        drop(passengers);
        info!(passenger_id = id, "passenger created");
        Ok(passenger)
    }

    /// Remove a passenger. Never broadcasts.
    pub fn delete_passenger(&self, id: &str) -> Result<()> {
        require_id(EntityKind::Passenger, id)?;
        if self.passengers.lock().remove(id).is_none() {
            return Err(RegistryError::NotFound {
                kind: EntityKind::Passenger,
                id: id.to_owned(),
            });
        }
        info!(passenger_id = id, "passenger deleted");
        Ok(())
    }

    /// All passengers, ordered by identifier.
    pub fn passengers(&self) -> Vec<Passenger> {
        self.passengers.lock().values().cloned().collect()
    }

    /// Number of registered passengers.
    pub fn passenger_count(&self) -> usize {
        self.passengers.lock().len()
    }
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new(SnapshotQueue::default())
    }
}

fn require_id(kind: EntityKind, id: &str) -> Result<()> {
    if id.is_empty() {
        Err(RegistryError::InvalidId { kind })
    } else {
        Ok(())
    }
}
