//! Server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use shuttle_settings::ServerSettings;

/// Runtime configuration for [`TrackerServer`](crate::server::TrackerServer).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` picks a free port).
    pub port: u16,
    /// Seconds between heartbeat sweeps.
    pub heartbeat_interval_secs: u64,
    /// Snapshots buffered between the registry and the dispatcher.
    pub broadcast_queue_capacity: usize,
    /// Outbound frames buffered per connection.
    pub send_queue_capacity: usize,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Seconds to wait for background tasks on shutdown.
    pub shutdown_timeout_secs: u64,
}

impl ServerConfig {
    /// Heartbeat period as a [`Duration`].
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    /// Shutdown grace period as a [`Duration`].
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// `host:port` string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&ServerSettings::default())
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(s: &ServerSettings) -> Self {
        Self {
            host: s.host.clone(),
            port: s.port,
            heartbeat_interval_secs: s.heartbeat_interval_secs,
            broadcast_queue_capacity: s.broadcast_queue_capacity,
            send_queue_capacity: s.send_queue_capacity,
            max_connections: s.max_connections,
            max_message_size: s.max_message_size,
            shutdown_timeout_secs: s.shutdown_timeout_secs,
        }
    }
}
