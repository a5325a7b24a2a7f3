//! Passive recovery of bus messages from captured link-layer frames.
//!
//! Used when the relay cannot (or should not) bind the DataBus listen port
//! itself. Frames are read from a [`FrameSource`] until a UDP datagram
//! addressed to the target port yields a decodable JSON object, or until the
//! time budget runs out. Running out of time is a normal outcome and returns
//! `Ok(None)`.

mod capture;
mod frame;

pub use capture::RawCapture;
pub use frame::{MIN_FRAME_LEN, extract_udp_payload, find_json_object};

#[cfg(test)]
pub(crate) use frame::test_frames as frame_fixtures;

use serde_json::{Map, Value};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

use crate::Result;
use crate::codec::WireCodec;
use crate::types::{FrameOrigin, RawFrame};

/// Largest frame read from a capture source
const MAX_FRAME_LEN: usize = 65535;

/// Longest single blocking read, so the deadline is rechecked regularly
const READ_SLICE: Duration = Duration::from_millis(200);

/// A blocking source of raw link-layer frames
pub trait FrameSource: Send + 'static {
    /// Read one frame into `buf`.
    ///
    /// Returns:
    /// - `Ok(Some(len))` - A frame of `len` bytes was read
    /// - `Ok(None)` - Nothing arrived within `timeout`
    /// - `Err(e)` - The source failed
    fn read_frame(&mut self, buf: &mut [u8], timeout: Duration) -> Result<Option<usize>>;
}

/// Extracts one JSON object per call from frames addressed to a UDP port
pub struct PacketSniffer<S: FrameSource> {
    source: S,
    port: u16,
    buffer: Vec<u8>,
}

impl PacketSniffer<RawCapture> {
    /// Sniff `port` on a raw capture socket bound to `interface`.
    ///
    /// Fails with `Configuration` when raw capture is not permitted.
    pub fn open(interface: &str, port: u16) -> Result<Self> {
        let capture = RawCapture::open(interface)?;
        info!(interface = capture.interface(), port, "Sniffing UDP traffic");
        Ok(Self::new(capture, port))
    }
}

impl<S: FrameSource> PacketSniffer<S> {
    /// Create a sniffer over an arbitrary frame source
    pub fn new(source: S, port: u16) -> Self {
        Self { source, port, buffer: vec![0u8; MAX_FRAME_LEN] }
    }

    /// Destination port being watched
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Read frames until one carries a JSON object for the target port.
    pub fn sniff_one(&mut self, timeout: Duration) -> Result<Option<Map<String, Value>>> {
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                trace!(port = self.port, "Sniff window elapsed without a match");
                return Ok(None);
            }

            let len = match self.source.read_frame(&mut self.buffer, remaining.min(READ_SLICE))? {
                Some(len) => len.min(self.buffer.len()),
                None => continue,
            };

            if let Some(object) = Self::decode_frame(&self.buffer[..len], self.port) {
                return Ok(Some(object));
            }
        }
    }

    fn decode_frame(frame: &[u8], port: u16) -> Option<Map<String, Value>> {
        let payload = extract_udp_payload(frame, port)?;
        let candidate = find_json_object(payload)?;
        let raw = RawFrame::new(candidate.to_vec(), FrameOrigin::Sniffed);
        match WireCodec::decode_frame(&raw) {
            Ok(map) => Some(map),
            Err(e) => {
                debug!("Discarding sniffed payload: {}", e);
                None
            }
        }
    }
}
