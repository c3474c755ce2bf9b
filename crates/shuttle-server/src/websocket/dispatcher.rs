//! Snapshot fan-out to every connected client.
//!
//! A single dispatcher consumes the registry's snapshot queue. After each
//! receive it drains whatever else is already queued and delivers only the
//! newest snapshot; every snapshot is the full driver set, so older ones add
//! nothing. A connection whose send fails is unregistered and delivery
//! continues to the rest.

use std::sync::Arc;

use axum::extract::ws::Utf8Bytes;
use metrics::counter;
use shuttle_core::Snapshot;
use tokio::sync::broadcast::Receiver;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::CloseReason;
use super::hub::ConnectionHub;
use crate::metrics::{BROADCAST_DROPS_TOTAL, BROADCASTS_TOTAL};

/// Outcome of delivering one snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Connections the snapshot was queued for.
    pub recipients: usize,
    /// Connections removed because the send failed.
    pub pruned: usize,
}

/// The single consumer of registry snapshots.
#[derive(Debug)]
pub struct BroadcastDispatcher {
    rx: Receiver<Snapshot>,
    hub: Arc<ConnectionHub>,
}

impl BroadcastDispatcher {
    /// Create a dispatcher reading from `rx` and writing to `hub`.
    ///
    /// Subscribe `rx` before any producer runs, or early snapshots are missed.
    pub fn new(rx: Receiver<Snapshot>, hub: Arc<ConnectionHub>) -> Self {
        Self { rx, hub }
    }

    /// Serialize `snapshot` once and queue it on every active connection.
    pub fn deliver(&self, snapshot: &Snapshot) -> Delivery {
        let payload = match snapshot.to_json() {
            Ok(json) => Utf8Bytes::from(json),
            Err(e) => {
                warn!(version = snapshot.version(), error = %e, "failed to serialize snapshot");
                return Delivery::default();
            }
        };

        let mut delivery = Delivery::default();
        for conn in self.hub.active_connections() {
            match conn.send_snapshot(payload.clone()) {
                Ok(()) => delivery.recipients += 1,
                Err(e) => {
                    warn!(conn_id = %conn.id, error = %e, "failed to send snapshot to client");
                    if self.hub.unregister(&conn.id, CloseReason::WriteFailure) {
                        delivery.pruned += 1;
                    }
                }
            }
        }
        counter!(BROADCASTS_TOTAL).increment(1);
        debug!(
            version = snapshot.version(),
            drivers = snapshot.len(),
            recipients = delivery.recipients,
            pruned = delivery.pruned,
            "broadcast snapshot"
        );
        delivery
    }

    /// Take the newest snapshot already queued behind `latest`.
    fn coalesce(&mut self, mut latest: Snapshot) -> Snapshot {
        let mut skipped: u64 = 0;
        loop {
            match self.rx.try_recv() {
                Ok(newer) => {
                    skipped += 1;
                    latest = newer;
                }
                Err(TryRecvError::Lagged(n)) => skipped += n,
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        if skipped > 0 {
            counter!(BROADCAST_DROPS_TOTAL).increment(skipped);
            debug!(skipped, version = latest.version(), "coalesced snapshots");
        }
        latest
    }

    /// Deliver snapshots until `cancel` fires or every producer is gone.
    ///
    /// On cancellation any snapshots still queued are discarded.
    #[instrument(skip_all)]
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("broadcast dispatcher started");
        loop {
            let received = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                received = self.rx.recv() => received,
            };
            match received {
                Ok(snapshot) => {
                    let latest = self.coalesce(snapshot);
                    let _ = self.deliver(&latest);
                }
                Err(RecvError::Lagged(n)) => {
                    warn!(skipped = n, "dispatcher lagging, oldest snapshots dropped");
                    counter!(BROADCAST_DROPS_TOTAL).increment(n);
                }
                Err(RecvError::Closed) => break,
            }
        }
        info!("broadcast dispatcher stopped");
    }
}
