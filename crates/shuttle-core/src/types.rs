//! Tracked entities, positions, and registry snapshots.

use std::sync::Arc;

use serde::{Deserialize, Serialize, Serializer};

use crate::errors::{Coordinate, RegistryError, Result};

/// A driver and its last reported position.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    /// Unique driver identifier.
    pub id: String,
    /// Latitude in degrees, `[-90, 90]`.
    pub latitude: f64,
    /// Longitude in degrees, `[-180, 180]`.
    pub longitude: f64,
}

impl Driver {
    /// A driver at the unset position `(0, 0)`.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            latitude: 0.0,
            longitude: 0.0,
        }
    }
}

/// A passenger. Passengers carry no position.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Passenger {
    /// Unique passenger identifier.
    pub id: String,
}

impl Passenger {
    /// Create a passenger.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// A validated latitude/longitude pair.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Position {
    latitude: f64,
    longitude: f64,
}

impl Position {
    /// Validate both coordinates. NaN is rejected like any other out-of-range value.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        check(Coordinate::Latitude, latitude)?;
        check(Coordinate::Longitude, longitude)?;
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Latitude in degrees.
    pub fn latitude(self) -> f64 {
        self.latitude
    }

    /// Longitude in degrees.
    pub fn longitude(self) -> f64 {
        self.longitude
    }
}

fn check(coordinate: Coordinate, value: f64) -> Result<()> {
    let limit = coordinate.limit();
    if (-limit..=limit).contains(&value) {
        Ok(())
    } else {
        Err(RegistryError::OutOfRange { coordinate, value })
    }
}

/// Inbound position report published by a driver's client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocationUpdate {
    /// Driver identifier.
    pub id: String,
    /// Reported latitude.
    pub latitude: f64,
    /// Reported longitude.
    pub longitude: f64,
}

impl LocationUpdate {
    /// Decode a JSON text frame. All three fields are required.
    pub fn decode(text: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Immutable, point-in-time copy of every driver.
///
/// Cloning is cheap (the driver list is shared). Serializes as a bare JSON
/// array of drivers, which is exactly the broadcast wire format.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    drivers: Arc<[Driver]>,
    version: u64,
}

impl Snapshot {
    /// Build a snapshot from already-copied drivers.
    pub fn new(drivers: Vec<Driver>, version: u64) -> Self {
        Self {
            drivers: drivers.into(),
            version,
        }
    }

    /// Registry version at capture time. Strictly increases with every driver mutation.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Drivers, ordered by identifier.
    pub fn drivers(&self) -> &[Driver] {
        &self.drivers
    }

    /// Look up a driver by identifier.
    pub fn get(&self, id: &str) -> Option<&Driver> {
        self.drivers.iter().find(|d| d.id == id)
    }

    /// Number of drivers.
    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    /// Whether the snapshot holds no drivers.
    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    /// Serialize to the broadcast wire format.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.drivers.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_driver_has_zero_position() {
        let d = Driver::new("D1");
        assert_eq!(d.id, "D1");
        assert_eq!(d.latitude, 0.0);
        assert_eq!(d.longitude, 0.0);
    }

    #[test]
    fn position_accepts_bounds() {
        assert!(Position::new(90.0, 180.0).is_ok());
        assert!(Position::new(-90.0, -180.0).is_ok());
        assert!(Position::new(34.0522, -118.2437).is_ok());
    }

    #[test]
    fn position_rejects_latitude_first() {
        let err = Position::new(91.0, 500.0).unwrap_err();
        assert_eq!(
            err,
            RegistryError::OutOfRange {
                coordinate: Coordinate::Latitude,
                value: 91.0
            }
        );
    }

    #[test]
    fn position_rejects_longitude() {
        let err = Position::new(0.0, -181.0).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::OutOfRange {
                coordinate: Coordinate::Longitude,
                ..
            }
        ));
    }

    #[test]
    fn position_rejects_nan() {
        assert!(Position::new(f64::NAN, 0.0).is_err());
        assert!(Position::new(0.0, f64::NAN).is_err());
    }

    #[test]
    fn decode_location_update() {
        let update =
            LocationUpdate::decode(r#"{"id":"D1","latitude":40.0,"longitude":-73.0}"#).unwrap();
        assert_eq!(update.id, "D1");
        assert_eq!(update.latitude, 40.0);
        assert_eq!(update.longitude, -73.0);
    }

    #[test]
    fn decode_rejects_missing_field() {
        assert!(LocationUpdate::decode(r#"{"id":"D1","latitude":40.0}"#).is_err());
    }

    #[test]
    fn decode_rejects_wrong_type() {
        assert!(LocationUpdate::decode(r#"{"id":"D1","latitude":"north","longitude":1}"#).is_err());
        assert!(LocationUpdate::decode("not json").is_err());
    }

    #[test]
    fn snapshot_serializes_as_array() {
        let snap = Snapshot::new(
            vec![Driver {
                id: "D1".into(),
                latitude: 40.0,
                longitude: -73.0,
            }],
            7,
        );
        let value: serde_json::Value = serde_json::from_str(&snap.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!([{"id": "D1", "latitude": 40.0, "longitude": -73.0}])
        );
    }

    #[test]
    fn empty_snapshot_serializes_as_empty_array() {
        assert_eq!(Snapshot::default().to_json().unwrap(), "[]");
    }

    #[test]
    fn snapshot_clone_shares_drivers() {
        let snap = Snapshot::new(vec![Driver::new("a"), Driver::new("b")], 1);
        let copy = snap.clone();
        assert_eq!(copy, snap);
        assert_eq!(copy.len(), 2);
        assert!(copy.get("b").is_some());
        assert!(copy.get("c").is_none());
    }
}
