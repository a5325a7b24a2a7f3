//! DataBus datagram codec
//!
//! Inbound datagrams may carry a chunk-sequence prefix `<index>|<data>`. The
//! prefix is stripped and the remainder decoded as one complete JSON object.
//! Each datagram is decoded on its own: a producer that splits one logical
//! message across several datagrams is not reassembled, since bus control
//! and telemetry messages fit in a single datagram.

use serde_json::{Map, Value};
use tracing::trace;

use crate::types::RawFrame;
use crate::{RelayError, Result};

/// Bytes scanned for the `|` separator of a chunk prefix
pub const CHUNK_PREFIX_SCAN: usize = 16;

/// Stateless encoder/decoder for DataBus datagrams
pub struct WireCodec;

impl WireCodec {
    /// Strip a `<decimal-index>|` prefix if one is present.
    ///
    /// The separator must appear within the first [`CHUNK_PREFIX_SCAN`] bytes
    /// and be preceded only by ASCII digits; otherwise the buffer is returned
    /// unchanged.
    pub fn strip_chunk_prefix(buf: &[u8]) -> &[u8] {
        let head = &buf[..buf.len().min(CHUNK_PREFIX_SCAN)];
        match head.iter().position(|&b| b == b'|') {
            Some(sep) if sep > 0 && head[..sep].iter().all(u8::is_ascii_digit) => {
                trace!("Stripped chunk prefix {:?}", String::from_utf8_lossy(&head[..sep]));
                &buf[sep + 1..]
            }
            _ => buf,
        }
    }

    /// Decode one datagram into a JSON value.
    ///
    /// Fails with `Parse` on invalid UTF-8 or JSON.
    pub fn decode(buf: &[u8]) -> Result<Value> {
        let body = Self::strip_chunk_prefix(buf);
        let text = std::str::from_utf8(body)
            .map_err(|e| RelayError::parse_error("datagram decoding", e.to_string()))?;
        serde_json::from_str(text.trim())
            .map_err(|e| RelayError::parse_error("datagram decoding", e.to_string()))
    }

    /// Decode one datagram and require a top-level JSON object.
    ///
    /// Non-object values fail with `Schema`.
    pub fn decode_object(buf: &[u8]) -> Result<Map<String, Value>> {
        match Self::decode(buf)? {
            Value::Object(map) => Ok(map),
            other => Err(RelayError::schema_error(
                "datagram decoding",
                format!("expected JSON object, found {}", json_kind(&other)),
            )),
        }
    }

    /// Decode a [`RawFrame`] into a JSON object
    pub fn decode_frame(frame: &RawFrame) -> Result<Map<String, Value>> {
        trace!(origin = ?frame.origin, len = frame.data.len(), "Decoding frame");
        Self::decode_object(&frame.data)
    }

    /// Split an outbound message into datagrams.
    ///
    /// Messages no larger than `max_packet_size` are sent as-is; larger ones
    /// are cut into `max_packet_size` chunks, each prefixed with `<index>|`.
    pub fn encode_chunks(payload: &[u8], max_packet_size: usize) -> Vec<Vec<u8>> {
        if payload.len() <= max_packet_size || max_packet_size == 0 {
            return vec![payload.to_vec()];
        }

        payload
            .chunks(max_packet_size)
            .enumerate()
            .map(|(index, chunk)| {
                let mut datagram = format!("{}|", index).into_bytes();
                datagram.extend_from_slice(chunk);
                datagram
            })
            .collect()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
