//! Error types for telemetry acquisition and delivery.
//!
//! Every fallible operation in the relay returns [`RelayError`]. The variants
//! line up with how the pipeline reacts to them:
//!
//! - **Parse / Schema**: a single inbound message was malformed. The message is
//!   logged and skipped; acquisition continues.
//! - **Transport / Timeout / Io**: delivery or socket trouble. The send loop
//!   backs off and pulls fresh data.
//! - **Configuration / UnsupportedPlatform**: fatal at startup, never retried.
//!
//! ```rust
//! use databus_relay::RelayError;
//!
//! let error = RelayError::http_status(503);
//! assert!(error.is_retryable());
//! assert!(!error.is_fatal());
//! for suggestion in error.recovery_suggestions() {
//!     println!("  - {}", suggestion);
//! }
//! ```

use std::time::Duration;
use thiserror::Error;

/// Result type alias for relay operations.
pub type Result<T, E = RelayError> = std::result::Result<T, E>;

/// Main error type for relay operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RelayError {
    #[error("Parse error in {context}: {details}")]
    Parse { context: String, details: String },

    #[error("Schema error in {context}: {details}")]
    Schema { context: String, details: String },

    #[error("Transport error: {reason}")]
    Transport {
        reason: String,
        status: Option<u16>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error during {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("{feature} is only available on {required_platform}")]
    UnsupportedPlatform { feature: String, required_platform: String },
}

impl RelayError {
    /// Returns whether retrying the operation (with fresh data) may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            RelayError::Transport { .. } => true,
            RelayError::Timeout { .. } => true,
            RelayError::Io { .. } => true,
            RelayError::Parse { .. } => false,
            RelayError::Schema { .. } => false,
            RelayError::Configuration { .. } => false,
            RelayError::UnsupportedPlatform { .. } => false,
        }
    }

    /// Returns whether the error must stop the process at startup.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RelayError::Configuration { .. } | RelayError::UnsupportedPlatform { .. })
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            RelayError::Parse { .. } => vec![
                "Check the producer emits UTF-8 JSON",
                "Verify chunk prefixes are '<index>|' only",
            ],
            RelayError::Schema { .. } => vec![
                "Ensure bus messages are JSON objects",
                "Check message type and body keys match a supported convention",
            ],
            RelayError::Transport { .. } => vec![
                "Check network connectivity to the collector",
                "Verify the API URL and API key",
                "Inspect collector logs for rejected requests",
            ],
            RelayError::Configuration { .. } => vec![
                "Set DRONE_ID, API_URL and API_KEY",
                "Check numeric environment values parse correctly",
            ],
            RelayError::Io { .. } => vec![
                "Check the listen port is free",
                "Verify the network interface exists",
            ],
            RelayError::Timeout { .. } => vec![
                "Increase the HTTP timeout",
                "Check collector responsiveness",
            ],
            RelayError::UnsupportedPlatform { .. } => vec![
                "Use the UDP bus source instead of sniffing",
                "Run on Linux for raw packet capture",
            ],
        }
    }

    /// Helper constructor for malformed bytes or JSON.
    pub fn parse_error(context: impl Into<String>, details: impl Into<String>) -> Self {
        RelayError::Parse { context: context.into(), details: details.into() }
    }

    /// Helper constructor for valid JSON with the wrong shape.
    pub fn schema_error(context: impl Into<String>, details: impl Into<String>) -> Self {
        RelayError::Schema { context: context.into(), details: details.into() }
    }

    /// Helper constructor for network-level send failures.
    pub fn transport_failed(reason: impl Into<String>) -> Self {
        RelayError::Transport { reason: reason.into(), status: None, source: None }
    }

    /// Helper constructor for a rejected HTTP response.
    pub fn http_status(status: u16) -> Self {
        RelayError::Transport {
            reason: format!("collector responded with HTTP {}", status),
            status: Some(status),
            source: None,
        }
    }

    /// Helper constructor for missing or invalid startup values.
    pub fn configuration(reason: impl Into<String>) -> Self {
        RelayError::Configuration { reason: reason.into() }
    }

    /// Helper constructor for I/O errors with operation context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        RelayError::Io { context: context.into(), source }
    }

    /// Helper constructor for unsupported platform errors.
    pub fn unsupported_platform(
        feature: impl Into<String>,
        required_platform: impl Into<String>,
    ) -> Self {
        RelayError::UnsupportedPlatform {
            feature: feature.into(),
            required_platform: required_platform.into(),
        }
    }
}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        RelayError::Io { context: "<unknown>".to_string(), source: err }
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::Parse { context: "JSON decoding".to_string(), details: err.to_string() }
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        RelayError::Transport {
            reason: err.to_string(),
            status: err.status().map(|s| s.as_u16()),
            source: Some(Box::new(err)),
        }
    }
}
