//! Bounded snapshot queue between the registry and the broadcast dispatcher.
//!
//! Overflow policy is drop-oldest: `publish` never blocks, and a consumer that
//! falls more than `capacity` snapshots behind skips the oldest ones (it sees
//! `RecvError::Lagged(n)` and resumes from the oldest retained snapshot).
//! Every snapshot is a full copy of driver state, so a skipped snapshot is
//! always superseded by a newer one.

use tokio::sync::broadcast;
use tracing::debug;

use crate::types::Snapshot;

/// Default number of snapshots buffered ahead of the dispatcher.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Producer side of the snapshot queue. Cloning shares the same queue.
#[derive(Clone, Debug)]
pub struct SnapshotQueue {
    tx: broadcast::Sender<Snapshot>,
    capacity: usize,
}

impl SnapshotQueue {
    /// Create a queue holding at most `capacity` pending snapshots (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Enqueue a snapshot without blocking.
    ///
    /// Returns the number of consumers that will see it. With no consumer
    /// attached the snapshot is discarded.
    pub fn publish(&self, snapshot: Snapshot) -> usize {
        let version = snapshot.version();
        if let Ok(consumers) = self.tx.send(snapshot) {
            consumers
        } else {
            debug!(version, "no dispatcher attached, snapshot discarded");
            0
        }
    }

    /// Attach a consumer. Only snapshots published after this call are seen.
    pub fn subscribe(&self) -> broadcast::Receiver<Snapshot> {
        self.tx.subscribe()
    }

    /// Maximum number of pending snapshots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for SnapshotQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}
