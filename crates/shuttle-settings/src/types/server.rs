//! Server network and connection settings.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Server tunables as stored in the settings file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Seconds between heartbeat sweeps.
    pub heartbeat_interval_secs: u64,
    /// Snapshots buffered between the registry and the dispatcher.
    pub broadcast_queue_capacity: usize,
    /// Outbound frames buffered per connection before it counts as stalled.
    pub send_queue_capacity: usize,
    /// Upper bound on simultaneously open WebSocket connections.
    pub max_connections: usize,
    /// Largest inbound WebSocket message accepted, in bytes.
    pub max_message_size: usize,
    /// Seconds to wait for background tasks during shutdown.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            heartbeat_interval_secs: 30,
            broadcast_queue_capacity: 64,
            send_queue_capacity: 32,
            max_connections: 1024,
            max_message_size: 64 * 1024,
            shutdown_timeout_secs: 10,
        }
    }
}

impl ServerSettings {
    pub(crate) fn validate(&self) -> Result<()> {
        let zero = [
            ("heartbeatIntervalSecs", self.heartbeat_interval_secs == 0),
            ("broadcastQueueCapacity", self.broadcast_queue_capacity == 0),
            ("sendQueueCapacity", self.send_queue_capacity == 0),
            ("maxConnections", self.max_connections == 0),
            ("maxMessageSize", self.max_message_size == 0),
        ];
        if let Some((name, _)) = zero.iter().find(|(_, is_zero)| *is_zero) {
            return Err(SettingsError::InvalidValue(format!(
                "server.{name} must be greater than zero"
            )));
        }
        Ok(())
    }
}
