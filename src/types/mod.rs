//! Core data types flowing through the relay pipeline.
//!
//! - [`RawFrame`]: bytes as received, tagged with their transport
//! - [`NormalizedMessage`]: type code plus body after alias resolution
//! - [`TelemetryState`]: the per-vehicle aggregate
//! - [`OutboundPayload`]: the snapshot sent to the collector

mod message;
mod payload;
mod state;

pub use message::{MessageType, NormalizedMessage};
pub use payload::{OutboundPayload, PayloadFlightState, PayloadPosition, SCHEMA_VERSION};
pub use state::{Attitude, Battery, FlightState, Link, Position, TelemetryState, Velocity};

/// Where a raw frame came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOrigin {
    /// Received on a bound datagram socket
    Socket,
    /// Extracted from a captured link-layer frame
    Sniffed,
}

/// Opaque bytes from the wire, discarded after one parse attempt
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub data: Vec<u8>,
    pub origin: FrameOrigin,
}

impl RawFrame {
    /// Create a new raw frame
    pub fn new(data: Vec<u8>, origin: FrameOrigin) -> Self {
        Self { data, origin }
    }
}
