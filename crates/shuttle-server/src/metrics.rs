//! Prometheus metrics recorder and `/metrics` rendering.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render `/metrics`. Fails if a recorder is
/// already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// A handle backed by a recorder that is not installed globally.
///
/// Renders nothing the process records; useful where a handle is required
/// but metrics are not wanted.
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

/// Render Prometheus text format.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// WebSocket connections opened (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections (counter, label: reason).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Open WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// WebSocket upgrades refused at the connection limit (counter).
pub const WS_CONNECTIONS_REFUSED_TOTAL: &str = "ws_connections_refused_total";
/// Snapshots delivered by the dispatcher (counter).
pub const BROADCASTS_TOTAL: &str = "broadcasts_total";
/// Snapshots skipped by drop-oldest or coalescing (counter).
pub const BROADCAST_DROPS_TOTAL: &str = "broadcast_drops_total";
/// Location updates applied from ingest (counter).
pub const LOCATION_UPDATES_TOTAL: &str = "location_updates_total";
/// Location updates rejected by the registry (counter, label: code).
pub const LOCATION_UPDATES_REJECTED_TOTAL: &str = "location_updates_rejected_total";
/// Connections pruned by the heartbeat monitor (counter).
pub const HEARTBEAT_PRUNED_TOTAL: &str = "heartbeat_pruned_total";
