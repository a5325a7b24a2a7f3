//! Renders telemetry into the collector's [`OutboundPayload`] schema.
//!
//! Two inputs are supported: an aggregated [`TelemetryState`] snapshot, and a
//! flat telemetry object supplied by an external producer. In both cases
//! position is always present (missing values default to `0.0`), while other
//! sections appear only when the source has them, with missing measurements
//! passed through as `null`.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::fields::{coerce_bool, coerce_f64, first_present};
use crate::types::{
    Attitude, Battery, Link, OutboundPayload, PayloadFlightState, PayloadPosition, SCHEMA_VERSION,
    TelemetryState, Velocity,
};

const POSITION_OBJECT_KEYS: &[&str] = &["position", "global_position", "gps", "location"];
const FLAT_LAT_KEYS: &[&str] = &["lat", "latitude"];
const FLAT_LON_KEYS: &[&str] = &["lon", "lng", "longitude"];
const FLAT_ALT_KEYS: &[&str] = &["alt_m", "alt", "altitude", "altitude_m", "relative_alt"];

/// ISO-8601 UTC timestamp with millisecond precision and a `Z` suffix
pub fn iso_utc(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Current time formatted by [`iso_utc`]
pub fn iso_utc_now() -> String {
    iso_utc(Utc::now())
}

/// Maps telemetry for one vehicle into outbound payloads
#[derive(Debug, Clone)]
pub struct PayloadMapper {
    drone_id: String,
}

impl PayloadMapper {
    /// Create a mapper stamping payloads with `drone_id`
    pub fn new(drone_id: impl Into<String>) -> Self {
        Self { drone_id: drone_id.into() }
    }

    /// Vehicle identifier stamped on every payload
    pub fn drone_id(&self) -> &str {
        &self.drone_id
    }

    /// Map an aggregated state snapshot, timestamped now
    pub fn from_state(&self, state: &TelemetryState) -> OutboundPayload {
        self.from_state_at(state, Utc::now())
    }

    /// Map an aggregated state snapshot with an explicit timestamp
    pub fn from_state_at(&self, state: &TelemetryState, ts: DateTime<Utc>) -> OutboundPayload {
        let position = state
            .position
            .map(|p| PayloadPosition {
                lat: p.lat.unwrap_or(0.0),
                lon: p.lon.unwrap_or(0.0),
                alt_m: p.alt_m.unwrap_or(0.0),
            })
            .unwrap_or_default();

        OutboundPayload {
            schema_version: SCHEMA_VERSION,
            drone_id: self.drone_id.clone(),
            ts: iso_utc(ts),
            position,
            attitude: state.attitude,
            velocity: state.velocity,
            flight_state: state.flight_state.as_ref().map(|s| PayloadFlightState {
                armed: Some(s.armed),
                mode: Some(s.mode.clone()),
            }),
            battery: state.battery,
            link: state.link,
        }
    }

    /// Map a flat telemetry object, timestamped now
    pub fn from_flat(&self, data: &Value) -> OutboundPayload {
        self.from_flat_at(data, Utc::now())
    }

    /// Map a flat telemetry object with an explicit timestamp.
    ///
    /// Non-object input maps to a payload with a zeroed position only.
    pub fn from_flat_at(&self, data: &Value, ts: DateTime<Utc>) -> OutboundPayload {
        let empty = Map::new();
        let data = data.as_object().unwrap_or(&empty);

        OutboundPayload {
            schema_version: SCHEMA_VERSION,
            drone_id: self.drone_id.clone(),
            ts: iso_utc(ts),
            position: flat_position(data),
            attitude: section(data, "attitude").map(|s| Attitude { yaw_deg: number(s, "yaw_deg") }),
            velocity: section(data, "velocity")
                .map(|s| Velocity { groundspeed_mps: number(s, "groundspeed_mps") }),
            flight_state: section(data, "state").map(|s| PayloadFlightState {
                armed: s.get("armed").and_then(coerce_bool),
                mode: s.get("mode").and_then(|m| m.as_str()).map(str::to_string),
            }),
            battery: section(data, "battery").map(|s| Battery {
                voltage_v: number(s, "voltage_v"),
                remaining_pct: number(s, "remaining_pct"),
            }),
            link: section(data, "link").map(|s| Link { rssi_dbm: number(s, "rssi_dbm") }),
        }
    }
}

fn section<'a>(data: &'a Map<String, Value>, key: &str) -> Option<&'a Map<String, Value>> {
    data.get(key).and_then(Value::as_object)
}

fn number(section: &Map<String, Value>, key: &str) -> Option<f64> {
    section.get(key).and_then(coerce_f64)
}

fn flat_position(data: &Map<String, Value>) -> PayloadPosition {
    let empty = Map::new();
    let source = POSITION_OBJECT_KEYS
        .iter()
        .find_map(|key| data.get(*key).and_then(Value::as_object))
        .unwrap_or(&empty);

    let resolve = |keys: &[&str]| {
        first_present(source, keys)
            .or_else(|| first_present(data, keys))
            .and_then(coerce_f64)
            .unwrap_or(0.0)
    };

    PayloadPosition {
        lat: resolve(FLAT_LAT_KEYS),
        lon: resolve(FLAT_LON_KEYS),
        alt_m: resolve(FLAT_ALT_KEYS),
    }
}
