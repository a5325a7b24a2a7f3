//! Normalized bus message types

use serde_json::{Map, Value};

/// Known DataBus message type codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// GPS fix (position section)
    Gps,
    /// Power / battery status
    Power,
    /// Navigation info: velocity, attitude, flight state and link
    NavInfo,
    /// Compact position report with fixed-point coordinates and yaw
    PositionCompact,
    /// MAVLink pass-through (not consumed by the aggregator)
    Mavlink,
    /// Any other integer code
    Other(i64),
}

impl MessageType {
    pub const GPS: i64 = 1002;
    pub const POWER: i64 = 1003;
    pub const NAV_INFO: i64 = 1036;
    pub const MAVLINK: i64 = 6502;
    pub const POSITION_COMPACT: i64 = 9102;

    /// Map an integer code to its message type
    pub fn from_code(code: i64) -> Self {
        match code {
            Self::GPS => MessageType::Gps,
            Self::POWER => MessageType::Power,
            Self::NAV_INFO => MessageType::NavInfo,
            Self::MAVLINK => MessageType::Mavlink,
            Self::POSITION_COMPACT => MessageType::PositionCompact,
            other => MessageType::Other(other),
        }
    }

    /// Integer code carried on the wire
    pub fn code(self) -> i64 {
        match self {
            MessageType::Gps => Self::GPS,
            MessageType::Power => Self::POWER,
            MessageType::NavInfo => Self::NAV_INFO,
            MessageType::Mavlink => Self::MAVLINK,
            MessageType::PositionCompact => Self::POSITION_COMPACT,
            MessageType::Other(code) => code,
        }
    }
}

/// One inbound message reduced to a type code and a body mapping.
///
/// Produced once per inbound message and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedMessage {
    code: Option<i64>,
    fields: Map<String, Value>,
}

impl NormalizedMessage {
    /// Create a normalized message
    pub fn new(code: Option<i64>, fields: Map<String, Value>) -> Self {
        Self { code, fields }
    }

    /// A message whose type could not be resolved and whose body is empty
    pub fn unknown() -> Self {
        Self { code: None, fields: Map::new() }
    }

    /// Integer type code, `None` when unknown
    pub fn code(&self) -> Option<i64> {
        self.code
    }

    /// Resolved message type, `None` when unknown
    pub fn message_type(&self) -> Option<MessageType> {
        self.code.map(MessageType::from_code)
    }

    /// Message body fields
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Whether the type code was resolved
    pub fn is_known(&self) -> bool {
        self.code.is_some()
    }
}
