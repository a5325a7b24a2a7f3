//! Provider trait for outbound payload sources

use crate::Result;
use crate::types::OutboundPayload;

/// Trait for payload sources pulled by the send loop
///
/// Sources abstract over where telemetry comes from (the vehicle bus, an
/// external feed) and block until fresh data is available.
#[async_trait::async_trait]
pub trait PayloadSource: Send + 'static {
    /// Wait for the next payload
    ///
    /// Returns:
    /// - `Ok(Some(payload))` - Fresh payload ready to send
    /// - `Ok(None)` - Source ended (normal termination)
    /// - `Err(e)` - Source failed; fatal errors stop the loop
    ///
    /// Malformed individual messages are skipped inside the source and never
    /// surface here.
    async fn next_payload(&mut self) -> Result<Option<OutboundPayload>>;
}
