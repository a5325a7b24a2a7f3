//! Folds normalized bus messages into one per-vehicle [`TelemetryState`].
//!
//! Each message type owns its sections and replaces them wholesale:
//!
//! - GPS (1002) → position
//! - POWER (1003) → battery
//! - NAV_INFO (1036) → velocity, attitude, flight state and link
//! - POSITION_COMPACT (9102) → position, plus attitude when yaw is present
//!
//! Anything else is ignored. `apply` and `snapshot` share one lock, so a
//! snapshot never observes a message half-applied.

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::fields::{coerce_bool, first_present, float_field};
use crate::types::{
    Attitude, Battery, FlightState, Link, MessageType, NormalizedMessage, Position,
    TelemetryState, Velocity,
};

/// Divisor for fixed-point latitude/longitude (degrees × 1e7)
pub const FIXED_POINT_SCALE: f64 = 1e7;

const LAT_KEYS: &[&str] = &["lat", "latitude", "y"];
const LON_KEYS: &[&str] = &["lon", "lng", "longitude", "x"];
const ALT_KEYS: &[&str] = &["alt", "alt_m", "altitude", "z"];

const SCALED_LAT_KEY: &str = "la";
const SCALED_LON_KEY: &str = "ln";
const SCALED_ALT_KEY: &str = "ha";
const COMPACT_YAW_KEY: &str = "y";

const VOLTAGE_KEYS: &[&str] = &["voltage", "voltage_v", "vbat"];
const REMAINING_KEYS: &[&str] = &["battery_remaining", "remaining", "remaining_pct"];

const GROUNDSPEED_KEYS: &[&str] = &["groundspeed", "groundspeed_mps", "ground_speed", "gs"];
const YAW_KEYS: &[&str] = &["yaw", "yaw_deg", "heading", "hdg"];
const ARMED_KEYS: &[&str] = &["armed", "is_armed"];
const MODE_KEYS: &[&str] = &["mode", "flight_mode"];
const RSSI_KEYS: &[&str] = &["rssi", "rssi_dbm", "signal_dbm"];

/// Owns the telemetry state of one vehicle
#[derive(Debug, Default)]
pub struct TelemetryAggregator {
    state: Mutex<TelemetryState>,
}

impl TelemetryAggregator {
    /// Create an aggregator with every section absent
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one message into the state.
    ///
    /// Returns whether any section was updated.
    pub fn apply(&self, message: &NormalizedMessage) -> bool {
        let Some(kind) = message.message_type() else {
            trace!("Ignoring message with unknown type");
            return false;
        };
        let fields = message.fields();

        match kind {
            MessageType::Gps => {
                let position = Self::gps_position(fields);
                self.state.lock().position = Some(position);
                true
            }
            MessageType::Power => {
                let battery = Battery {
                    voltage_v: float_field(fields, VOLTAGE_KEYS),
                    remaining_pct: float_field(fields, REMAINING_KEYS),
                };
                self.state.lock().battery = Some(battery);
                true
            }
            MessageType::NavInfo => {
                let velocity = Velocity { groundspeed_mps: float_field(fields, GROUNDSPEED_KEYS) };
                let attitude = Attitude { yaw_deg: float_field(fields, YAW_KEYS) };
                let flight_state = Self::flight_state(fields);
                let link = Link { rssi_dbm: float_field(fields, RSSI_KEYS) };

                let mut state = self.state.lock();
                state.velocity = Some(velocity);
                state.attitude = Some(attitude);
                state.flight_state = Some(flight_state);
                state.link = Some(link);
                true
            }
            MessageType::PositionCompact => self.apply_compact(fields),
            MessageType::Mavlink | MessageType::Other(_) => {
                trace!(code = kind.code(), "Message type not aggregated");
                false
            }
        }
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> TelemetryState {
        self.state.lock().clone()
    }

    fn gps_position(fields: &Map<String, Value>) -> Position {
        // `ha` is plain metres in both layouts; only la/ln mark fixed-point
        let alt_m =
            float_field(fields, &[SCALED_ALT_KEY]).or_else(|| float_field(fields, ALT_KEYS));
        let scaled = [SCALED_LAT_KEY, SCALED_LON_KEY].iter().any(|key| fields.contains_key(*key));

        if scaled {
            return Position {
                lat: float_field(fields, &[SCALED_LAT_KEY]).map(|v| v / FIXED_POINT_SCALE),
                lon: float_field(fields, &[SCALED_LON_KEY]).map(|v| v / FIXED_POINT_SCALE),
                alt_m,
            };
        }

        Position {
            lat: float_field(fields, LAT_KEYS),
            lon: float_field(fields, LON_KEYS),
            alt_m: float_field(fields, ALT_KEYS).or(alt_m),
        }
    }

    fn flight_state(fields: &Map<String, Value>) -> FlightState {
        let armed = first_present(fields, ARMED_KEYS).and_then(coerce_bool).unwrap_or(false);
        let mode = match first_present(fields, MODE_KEYS) {
            Some(Value::String(mode)) => mode.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => FlightState::UNKNOWN_MODE.to_string(),
        };
        FlightState { armed, mode }
    }

    fn apply_compact(&self, fields: &Map<String, Value>) -> bool {
        let lat = float_field(fields, &[SCALED_LAT_KEY]);
        let lon = float_field(fields, &[SCALED_LON_KEY]);
        let (Some(lat), Some(lon)) = (lat, lon) else {
            debug!("Compact position without la/ln, ignoring");
            return false;
        };

        let position = Position {
            lat: Some(lat / FIXED_POINT_SCALE),
            lon: Some(lon / FIXED_POINT_SCALE),
            alt_m: float_field(fields, &[SCALED_ALT_KEY]),
        };
        let yaw = float_field(fields, &[COMPACT_YAW_KEY]);

        let mut state = self.state.lock();
        state.position = Some(position);
        if let Some(yaw_deg) = yaw {
            state.attitude = Some(Attitude { yaw_deg: Some(yaw_deg) });
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::MessageNormalizer;
    use serde_json::json;

    fn message(value: Value) -> NormalizedMessage {
        MessageNormalizer::normalize_value(&value)
    }

    #[test]
    fn gps_aliases_fill_position() {
        let agg = TelemetryAggregator::new();
        assert!(agg.apply(&message(json!({
            "mt": "1002",
            "ms": {"latitude": 5.6037, "longitude": -0.187, "altitude": 120.3}
        }))));

        let position = agg.snapshot().position.unwrap();
        assert_eq!(position.lat, Some(5.6037));
        assert_eq!(position.lon, Some(-0.187));
        assert_eq!(position.alt_m, Some(120.3));
    }

    #[test]
    fn gps_xyz_convention_is_understood() {
        let agg = TelemetryAggregator::new();
        agg.apply(&message(json!({"type": 1002, "payload": {"y": 1.0, "x": 2.0, "z": 3.0}})));
        assert_eq!(
            agg.snapshot().position,
            Some(Position { lat: Some(1.0), lon: Some(2.0), alt_m: Some(3.0) })
        );
    }

    #[test]
    fn fixed_point_gps_is_scaled() {
        let agg = TelemetryAggregator::new();
        agg.apply(&message(json!({
            "message_type": 1002,
            "cmd": {"la": 56037000, "ln": -1870000, "ha": 100}
        })));

        let position = agg.snapshot().position.unwrap();
        assert_eq!(position.lat, Some(5.6037));
        assert_eq!(position.lon, Some(-0.187));
        assert_eq!(position.alt_m, Some(100.0));
    }

    #[test]
    fn sections_do_not_clobber_each_other() {
        let agg = TelemetryAggregator::new();
        agg.apply(&message(json!({"mt": 1003, "ms": {"voltage": 22.2, "battery_remaining": 66}})));
        agg.apply(&message(json!({"mt": 1002, "ms": {"lat": 1.2, "lon": 3.4, "alt": 5.6}})));

        let state = agg.snapshot();
        assert_eq!(
            state.battery,
            Some(Battery { voltage_v: Some(22.2), remaining_pct: Some(66.0) })
        );
        assert_eq!(state.position.unwrap().lat, Some(1.2));
    }

    #[test]
    fn gps_alone_leaves_battery_absent() {
        let agg = TelemetryAggregator::new();
        agg.apply(&message(json!({"mt": 1002, "ms": {"lat": 1.2, "lon": 3.4}})));

        let state = agg.snapshot();
        assert!(state.battery.is_none());
        assert_eq!(state.position.unwrap().alt_m, None);
    }

    #[test]
    fn nav_info_sets_four_sections_with_defaults() {
        let agg = TelemetryAggregator::new();
        agg.apply(&message(json!({"mt": 1036, "ms": {"groundspeed": 12.3, "yaw": 45}})));

        let state = agg.snapshot();
        assert_eq!(state.velocity, Some(Velocity { groundspeed_mps: Some(12.3) }));
        assert_eq!(state.attitude, Some(Attitude { yaw_deg: Some(45.0) }));
        assert_eq!(state.flight_state, Some(FlightState::default()));
        assert_eq!(state.link, Some(Link { rssi_dbm: None }));
        assert!(state.position.is_none());
    }

    #[test]
    fn nav_info_reads_armed_and_mode() {
        let agg = TelemetryAggregator::new();
        agg.apply(&message(json!({
            "mt": 1036,
            "ms": {"armed": true, "mode": "AUTO", "rssi": -61}
        })));

        let state = agg.snapshot();
        assert_eq!(
            state.flight_state,
            Some(FlightState { armed: true, mode: "AUTO".to_string() })
        );
        assert_eq!(state.link, Some(Link { rssi_dbm: Some(-61.0) }));
    }

    #[test]
    fn later_message_replaces_whole_section() {
        let agg = TelemetryAggregator::new();
        agg.apply(&message(json!({"mt": 1003, "ms": {"voltage": 22.2, "remaining": 80}})));
        agg.apply(&message(json!({"mt": 1003, "ms": {"vbat": 21.9}})));

        assert_eq!(
            agg.snapshot().battery,
            Some(Battery { voltage_v: Some(21.9), remaining_pct: None })
        );
    }

    #[test]
    fn compact_position_updates_position_and_yaw() {
        let agg = TelemetryAggregator::new();
        assert!(agg.apply(&message(json!({
            "mt": 9102,
            "ms": {"la": 56037000, "ln": -1870000, "ha": 120.3, "y": 45}
        }))));

        let state = agg.snapshot();
        assert_eq!(
            state.position,
            Some(Position { lat: Some(5.6037), lon: Some(-0.187), alt_m: Some(120.3) })
        );
        assert_eq!(state.attitude, Some(Attitude { yaw_deg: Some(45.0) }));
    }

    #[test]
    fn altitude_only_scaled_key_keeps_plain_coordinates() {
        let agg = TelemetryAggregator::new();
        assert!(agg.apply(&message(json!({
            "mt": 1002,
            "ms": {"lat": 5.6037, "lon": -0.187, "ha": 118.0}
        }))));

        assert_eq!(
            agg.snapshot().position,
            Some(Position { lat: Some(5.6037), lon: Some(-0.187), alt_m: Some(118.0) })
        );
    }

    #[test]
    fn compact_position_without_coordinates_is_ignored() {
        let agg = TelemetryAggregator::new();
        assert!(!agg.apply(&message(json!({"mt": 9102, "ms": {"la": 56037000}}))));
        assert_eq!(agg.snapshot(), TelemetryState::default());
    }

    #[test]
    fn unknown_and_passthrough_types_are_noops() {
        let agg = TelemetryAggregator::new();
        assert!(!agg.apply(&message(json!({"mt": 6502, "ms": {"lat": 1.0}}))));
        assert!(!agg.apply(&message(json!({"mt": "bogus", "ms": {"lat": 1.0}}))));
        assert!(!agg.apply(&message(json!({"mt": 4242}))));
        assert_eq!(agg.snapshot(), TelemetryState::default());
    }

    #[test]
    fn snapshot_is_detached_from_later_updates() {
        let agg = TelemetryAggregator::new();
        agg.apply(&message(json!({"mt": 1002, "ms": {"lat": 1.0, "lon": 2.0}})));
        let before = agg.snapshot();
        agg.apply(&message(json!({"mt": 1002, "ms": {"lat": 9.0, "lon": 9.0}})));

        assert_eq!(before.position.unwrap().lat, Some(1.0));
        assert_eq!(agg.snapshot().position.unwrap().lat, Some(9.0));
    }
}
