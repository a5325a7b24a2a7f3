//! Message normalization across DataBus key conventions.
//!
//! Producers on the bus name the type discriminator and the body differently.
//! The normalizer checks the canonical key first, then each alias in order,
//! and always produces a [`NormalizedMessage`]: an unresolvable type becomes
//! unknown and a missing or non-object body becomes an empty mapping.
//!
//! | Canonical      | Aliases                                      |
//! |----------------|----------------------------------------------|
//! | `message_type` | `messageType`, `type`, `mt`                  |
//! | `cmd`          | `messageCmd`, `message`, `payload`, `ms`     |

use serde_json::{Map, Value};
use tracing::trace;

use crate::fields::{coerce_i64, first_present};
use crate::types::NormalizedMessage;

/// Type discriminator keys, canonical first
pub const MESSAGE_TYPE_KEYS: [&str; 4] = ["message_type", "messageType", "type", "mt"];

/// Body keys, canonical first
pub const MESSAGE_BODY_KEYS: [&str; 5] = ["cmd", "messageCmd", "message", "payload", "ms"];

/// Resolves type and body for one decoded message
pub struct MessageNormalizer;

impl MessageNormalizer {
    /// Normalize a decoded JSON object. Never fails.
    pub fn normalize(message: &Map<String, Value>) -> NormalizedMessage {
        let code = Self::resolve_type(message);
        let fields = Self::resolve_body(message);
        trace!(?code, fields = fields.len(), "Normalized bus message");
        NormalizedMessage::new(code, fields)
    }

    /// Normalize any JSON value; non-objects become unknown messages
    pub fn normalize_value(message: &Value) -> NormalizedMessage {
        match message {
            Value::Object(map) => Self::normalize(map),
            _ => NormalizedMessage::unknown(),
        }
    }

    /// Integer message type, `None` when absent or not numeric
    pub fn resolve_type(message: &Map<String, Value>) -> Option<i64> {
        first_present(message, &MESSAGE_TYPE_KEYS).and_then(coerce_i64)
    }

    /// Message body as an object; a string holding JSON object text is parsed
    pub fn resolve_body(message: &Map<String, Value>) -> Map<String, Value> {
        match first_present(message, &MESSAGE_BODY_KEYS) {
            Some(Value::Object(body)) => body.clone(),
            Some(Value::String(text)) => match serde_json::from_str::<Value>(text) {
                Ok(Value::Object(body)) => body,
                _ => Map::new(),
            },
            _ => Map::new(),
        }
    }
}
