//! Hub-wide heartbeat ping/pong liveness monitoring.
//!
//! One monitor per hub, claimed through
//! [`ConnectionHub::heartbeat_monitor`](super::hub::ConnectionHub::heartbeat_monitor).
//! Each sweep probes every connection. A connection that did not show any
//! inbound activity since the previous probe is pruned, so a silent client
//! leaves the active set at the start of the cycle after its missed probe.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::CloseReason;
use super::hub::ConnectionHub;
use crate::metrics::HEARTBEAT_PRUNED_TOTAL;

/// Result of one heartbeat sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Connections that were sent a probe.
    pub probed: usize,
    /// Connections removed from the hub.
    pub pruned: usize,
}

/// Periodic liveness prober for every connection in a hub.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    hub: Arc<ConnectionHub>,
    interval: Duration,
}

impl HeartbeatMonitor {
    pub(super) fn new(hub: Arc<ConnectionHub>, interval: Duration) -> Self {
        Self { hub, interval }
    }

    /// Sweep period.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Probe every active connection once.
    ///
    /// Connections that missed the previous probe, or whose probe cannot be
    /// queued, are unregistered.
    pub fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();
        for conn in self.hub.active_connections() {
            if !conn.check_alive() {
                if self.hub.unregister(&conn.id, CloseReason::HeartbeatTimeout) {
                    warn!(conn_id = %conn.id, idle = ?conn.idle(), "no response to liveness probe, pruning");
                    report.pruned += 1;
                }
                continue;
            }
            match conn.send_ping() {
                Ok(()) => report.probed += 1,
                Err(e) => {
                    if self.hub.unregister(&conn.id, CloseReason::WriteFailure) {
                        warn!(conn_id = %conn.id, error = %e, "liveness probe failed, pruning");
                        report.pruned += 1;
                    }
                }
            }
        }
        if report.pruned > 0 {
            counter!(HEARTBEAT_PRUNED_TOTAL).increment(report.pruned as u64);
        }
        debug!(probed = report.probed, pruned = report.pruned, "heartbeat sweep");
        report
    }

    /// Sweep every `interval` until `cancel` fires.
    #[instrument(skip_all, fields(interval = ?self.interval))]
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Skip the immediate first tick
        let _ = ticker.tick().await;

        info!("heartbeat monitor started");
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let _ = self.sweep();
                }
            }
        }
        info!("heartbeat monitor stopped");
    }
}
