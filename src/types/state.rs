//! Aggregated per-vehicle telemetry state

use serde::{Deserialize, Serialize};

/// Geographic position in degrees and metres
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub alt_m: Option<f64>,
}

/// Ground velocity
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub groundspeed_mps: Option<f64>,
}

/// Heading
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Attitude {
    pub yaw_deg: Option<f64>,
}

/// Arming state and flight mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightState {
    pub armed: bool,
    pub mode: String,
}

impl FlightState {
    /// Mode reported when the source did not provide one
    pub const UNKNOWN_MODE: &'static str = "UNKNOWN";
}

impl Default for FlightState {
    fn default() -> Self {
        Self { armed: false, mode: Self::UNKNOWN_MODE.to_string() }
    }
}

/// Battery status
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Battery {
    pub voltage_v: Option<f64>,
    pub remaining_pct: Option<f64>,
}

/// Radio link quality
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub rssi_dbm: Option<f64>,
}

/// Latest known telemetry for one vehicle.
///
/// Each section is either absent or holds the values of the last message
/// that targeted it. Sections never read or clear one another.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryState {
    pub position: Option<Position>,
    pub velocity: Option<Velocity>,
    pub attitude: Option<Attitude>,
    pub flight_state: Option<FlightState>,
    pub battery: Option<Battery>,
    pub link: Option<Link>,
}

