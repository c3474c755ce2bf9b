//! The set of open subscriber connections.
//!
//! The hub is the only owner of the active set. Readers (dispatcher,
//! heartbeat, health) receive a copied `Vec` taken under a brief read lock
//! and iterate it with the lock released, so sends never race registration.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use metrics::gauge;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::connection::{ClientConnection, CloseReason, ConnectionId};
use super::heartbeat::HeartbeatMonitor;
use crate::metrics::WS_CONNECTIONS_ACTIVE;

#[derive(Debug, Default)]
struct ActiveSet {
    connections: HashMap<ConnectionId, Arc<ClientConnection>>,
    /// Set by `close_all`; no registration succeeds afterwards.
    closed: bool,
}

/// Tracks currently open connections.
#[derive(Debug)]
pub struct ConnectionHub {
    active: RwLock<ActiveSet>,
    limit: usize,
    monitor_claimed: AtomicBool,
}

impl ConnectionHub {
    /// Create an empty hub with no connection limit.
    pub fn new() -> Self {
        Self::with_limit(usize::MAX)
    }

    /// Create an empty hub that holds at most `limit` connections.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            active: RwLock::new(ActiveSet::default()),
            limit,
            monitor_claimed: AtomicBool::new(false),
        }
    }

    /// Add a connection to the active set.
    ///
    /// Registering the same handle again is a no-op. Refused with the reason
    /// the caller should close with when the connection has already started
    /// closing, the hub has been closed by [`close_all`](Self::close_all), or
    /// the hub is at its limit.
    pub fn register(&self, connection: Arc<ClientConnection>) -> Result<(), CloseReason> {
        if connection.is_closing() {
            return Err(connection.close_reason().unwrap_or(CloseReason::Shutdown));
        }
        let mut active = self.active.write();
        if active.closed {
            return Err(CloseReason::Shutdown);
        }
        if active.connections.contains_key(&connection.id) {
            return Ok(());
        }
        if active.connections.len() >= self.limit {
            drop(active);
            warn!(conn_id = %connection.id, limit = self.limit, "hub full, refusing connection");
            return Err(CloseReason::Overloaded);
        }
        let _ = connection.mark_open();
        let id = connection.id.clone();
        let _ = active.connections.insert(id.clone(), connection);
        let count = active.connections.len();
        drop(active);
        record_active(count);
        debug!(conn_id = %id, connections = count, "connection registered");
        Ok(())
    }

    /// Remove a connection and signal its session to release the transport.
    ///
    /// Safe to call any number of times; only the first call has an effect.
    /// Returns `true` if this call removed the connection.
    pub fn unregister(&self, id: &ConnectionId, reason: CloseReason) -> bool {
        let mut active = self.active.write();
        let removed = active.connections.remove(id);
        let count = active.connections.len();
        drop(active);

        let Some(connection) = removed else {
            return false;
        };
        let _ = connection.begin_close(reason);
        record_active(count);
        info!(conn_id = %id, reason = %reason, connections = count, "connection unregistered");
        true
    }

    /// Point-in-time copy of the active set.
    pub fn active_connections(&self) -> Vec<Arc<ClientConnection>> {
        self.active.read().connections.values().cloned().collect()
    }

    /// Whether `id` is in the active set.
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.active.read().connections.contains_key(id)
    }

    /// Number of active connections.
    pub fn connection_count(&self) -> usize {
        self.active.read().connections.len()
    }

    /// Maximum number of connections the hub accepts.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Whether [`close_all`](Self::close_all) has run.
    pub fn is_closed(&self) -> bool {
        self.active.read().closed
    }

    /// Close the hub: unregister every connection and refuse new ones.
    /// Returns how many were closed.
    pub fn close_all(&self, reason: CloseReason) -> usize {
        let drained: Vec<_> = {
            let mut active = self.active.write();
            active.closed = true;
            active.connections.drain().collect()
        };
        record_active(0);
        for (_, connection) in &drained {
            let _ = connection.begin_close(reason);
        }
        if !drained.is_empty() {
            info!(count = drained.len(), reason = %reason, "closed all connections");
        }
        drained.len()
    }

    /// Claim this hub's heartbeat monitor.
    ///
    /// Returns `Some` exactly once per hub; later calls return `None`.
    pub fn heartbeat_monitor(self: &Arc<Self>, interval: Duration) -> Option<HeartbeatMonitor> {
        if self.monitor_claimed.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(HeartbeatMonitor::new(Arc::clone(self), interval))
    }
}

impl Default for ConnectionHub {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(clippy::cast_precision_loss)]
fn record_active(count: usize) {
    gauge!(WS_CONNECTIONS_ACTIVE).set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::connection::{ConnectionState, Outbound};
    use tokio::sync::mpsc;

    fn make_connection(id: &str) -> (Arc<ClientConnection>, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(8);
        (
            Arc::new(ClientConnection::new(ConnectionId::from(id), tx)),
            rx,
        )
    }

    #[test]
    fn register_adds_and_opens() {
        let hub = ConnectionHub::new();
        let (conn, _rx) = make_connection("a");
        assert_eq!(hub.register(conn.clone()), Ok(()));
        assert_eq!(hub.connection_count(), 1);
        assert_eq!(conn.state(), ConnectionState::Open);
        assert!(hub.contains(&conn.id));
    }

    #[test]
    fn register_is_idempotent() {
        let hub = ConnectionHub::new();
        let (conn, _rx) = make_connection("a");
        assert_eq!(hub.register(conn.clone()), Ok(()));
        assert_eq!(hub.register(conn.clone()), Ok(()));
        assert_eq!(hub.connection_count(), 1);
    }

    #[test]
    fn register_refuses_closing_connection() {
        let hub = ConnectionHub::new();
        let (conn, _rx) = make_connection("a");
        let _ = conn.begin_close(CloseReason::HeartbeatTimeout);
        assert_eq!(hub.register(conn), Err(CloseReason::HeartbeatTimeout));
        assert_eq!(hub.connection_count(), 0);
    }

    #[test]
    fn unregister_twice_is_noop() {
        let hub = ConnectionHub::new();
        let (conn, _rx) = make_connection("a");
        let _ = hub.register(conn.clone());
        assert!(hub.unregister(&conn.id, CloseReason::WriteFailure));
        assert!(!hub.unregister(&conn.id, CloseReason::HeartbeatTimeout));
        assert_eq!(hub.connection_count(), 0);
        assert_eq!(conn.state(), ConnectionState::Closing);
        assert_eq!(conn.close_reason(), Some(CloseReason::WriteFailure));
    }

    #[test]
    fn unregister_unknown_is_noop() {
        let hub = ConnectionHub::new();
        assert!(!hub.unregister(&ConnectionId::from("ghost"), CloseReason::ClientClosed));
    }

    #[test]
    fn active_connections_is_a_copy() {
        let hub = ConnectionHub::new();
        let (a, _ra) = make_connection("a");
        let (b, _rb) = make_connection("b");
        let _ = hub.register(a.clone());
        let _ = hub.register(b);
        let snapshot = hub.active_connections();
        let _ = hub.unregister(&a.id, CloseReason::ClientClosed);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(hub.active_connections().len(), 1);
    }

    #[test]
    fn close_all_empties_hub() {
        let hub = ConnectionHub::new();
        let conns: Vec<_> = (0..3)
            .map(|i| make_connection(&format!("c{i}")))
            .collect();
        for (c, _) in &conns {
            let _ = hub.register(c.clone());
        }
        assert_eq!(hub.close_all(CloseReason::Shutdown), 3);
        assert_eq!(hub.connection_count(), 0);
        for (c, _) in &conns {
            assert_eq!(c.close_reason(), Some(CloseReason::Shutdown));
        }
    }

    #[test]
    fn register_after_close_all_is_refused() {
        let hub = ConnectionHub::new();
        let (early, _re) = make_connection("early");
        let _ = hub.register(early.clone());
        let _ = hub.close_all(CloseReason::Shutdown);
        assert!(hub.is_closed());

        let (late, _rl) = make_connection("late");
        assert_eq!(hub.register(late.clone()), Err(CloseReason::Shutdown));
        assert_eq!(hub.connection_count(), 0);
        assert!(!hub.contains(&late.id));
        assert_eq!(late.state(), ConnectionState::Connecting);
    }

    #[test]
    fn limit_is_enforced_on_register() {
        let hub = ConnectionHub::with_limit(2);
        let conns: Vec<_> = (0..3)
            .map(|i| make_connection(&format!("c{i}")))
            .collect();
        assert_eq!(hub.register(conns[0].0.clone()), Ok(()));
        assert_eq!(hub.register(conns[1].0.clone()), Ok(()));
        assert_eq!(hub.register(conns[2].0.clone()), Err(CloseReason::Overloaded));
        // Re-registering a member at the limit is still a no-op success.
        assert_eq!(hub.register(conns[0].0.clone()), Ok(()));

        let _ = hub.unregister(&conns[0].0.id, CloseReason::ClientClosed);
        assert_eq!(hub.register(conns[2].0.clone()), Ok(()));
        assert_eq!(hub.connection_count(), 2);
    }

    #[test]
    fn concurrent_registration_never_exceeds_limit() {
        let hub = ConnectionHub::with_limit(5);
        let conns: Vec<_> = (0..40)
            .map(|i| make_connection(&format!("c{i}")))
            .collect();
        let admitted = std::sync::atomic::AtomicUsize::new(0);
        std::thread::scope(|s| {
            for (c, _) in &conns {
                let (hub, admitted) = (&hub, &admitted);
                let c = c.clone();
                let _ = s.spawn(move || {
                    if hub.register(c).is_ok() {
                        let _ = admitted.fetch_add(1, Ordering::Relaxed);
                    }
                });
            }
        });
        assert_eq!(admitted.load(Ordering::Relaxed), 5);
        assert_eq!(hub.connection_count(), 5);
    }

    #[test]
    fn heartbeat_monitor_claimed_once() {
        let hub = Arc::new(ConnectionHub::new());
        assert!(hub.heartbeat_monitor(Duration::from_secs(30)).is_some());
        assert!(hub.heartbeat_monitor(Duration::from_secs(30)).is_none());
    }

    #[test]
    fn concurrent_register_and_unregister() {
        let hub = ConnectionHub::new();
        let conns: Vec<_> = (0..50)
            .map(|i| make_connection(&format!("c{i}")))
            .collect();
        std::thread::scope(|s| {
            for (c, _) in &conns {
                let hub = &hub;
                let c = c.clone();
                let _ = s.spawn(move || {
                    let _ = hub.register(c.clone());
                    let _ = hub.active_connections();
                    let _ = hub.unregister(&c.id, CloseReason::ClientClosed);
                });
            }
        });
        assert_eq!(hub.connection_count(), 0);
    }
}
