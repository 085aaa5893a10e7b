//! Sensor reading data model.
//!
//! A `SensorReading` is one observation from a roadside sensor unit: the
//! deployment's location, the air quality index and the vehicle count.
//! It serializes directly to the JSON body the backend expects.

use serde::{Deserialize, Serialize};

/// A single parsed sensor observation ready for delivery.
///
/// Field names on the wire match the backend's `/api/updateSensor` contract:
/// `locationId`, `aqi`, `vehicle_count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Fixed identifier of the deployment location
    #[serde(rename = "locationId")]
    location_id: i64,

    /// Air quality index reported by the device
    aqi: i64,

    /// Number of vehicles counted since the previous reading
    vehicle_count: i64,
}

impl SensorReading {
    /// Create a reading from its three fields.
    ///
    /// No range checks happen here; the parser is responsible for rejecting
    /// negative device values.
    pub fn new(location_id: i64, aqi: i64, vehicle_count: i64) -> Self {
        Self {
            location_id,
            aqi,
            vehicle_count,
        }
    }

    pub fn location_id(&self) -> i64 {
        self.location_id
    }

    pub fn aqi(&self) -> i64 {
        self.aqi
    }

    pub fn vehicle_count(&self) -> i64 {
        self.vehicle_count
    }
}

impl std::fmt::Display for SensorReading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "location={} aqi={} vehicles={}",
            self.location_id, self.aqi, self.vehicle_count
        )
    }
}
