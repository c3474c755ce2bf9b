//! Settings type definitions.
//!
//! Field names are camelCase on disk. Every section carries `#[serde(default)]`
//! so a partial file only needs the keys it changes.

mod logging;
mod server;

pub use logging::*;
pub use server::*;

use serde::{Deserialize, Serialize};

/// Root settings for the tracker.
///
/// ```json
/// {
///   "server": { "port": 9000, "heartbeatIntervalSecs": 15 },
///   "logging": { "level": "debug", "format": "json" }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackerSettings {
    /// Network and connection tunables.
    pub server: ServerSettings,
    /// Log level and output format.
    pub logging: LoggingSettings,
}

impl TrackerSettings {
    /// Reject combinations that deserialize fine but cannot run.
    pub fn validate(&self) -> crate::Result<()> {
        self.server.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let settings: TrackerSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, TrackerSettings::default());
    }

    #[test]
    fn serializes_camel_case() {
        let value = serde_json::to_value(TrackerSettings::default()).unwrap();
        assert!(value["server"]["heartbeatIntervalSecs"].is_u64());
        assert!(value["server"]["broadcastQueueCapacity"].is_u64());
        assert_eq!(value["logging"]["level"], "info");
    }

    #[test]
    fn defaults_validate() {
        assert!(TrackerSettings::default().validate().is_ok());
    }
}
