//! Outbound collector payload

use serde::{Deserialize, Serialize};

use super::{Attitude, Battery, Link, Velocity};

/// Schema version stamped on every payload
pub const SCHEMA_VERSION: u32 = 1;

/// Position as delivered to the collector; always fully populated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PayloadPosition {
    pub lat: f64,
    pub lon: f64,
    pub alt_m: f64,
}

/// Flight state as delivered to the collector.
///
/// Sub-fields pass `null` through when the source section lacked them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PayloadFlightState {
    pub armed: Option<bool>,
    pub mode: Option<String>,
}

/// Snapshot body POSTed to the collector.
///
/// Optional sections are omitted when unknown; a present section with a
/// missing measurement serializes that measurement as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundPayload {
    pub schema_version: u32,
    pub drone_id: String,
    pub ts: String,
    pub position: PayloadPosition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attitude: Option<Attitude>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity: Option<Velocity>,
    #[serde(default, rename = "state", skip_serializing_if = "Option::is_none")]
    pub flight_state: Option<PayloadFlightState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery: Option<Battery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<Link>,
}
