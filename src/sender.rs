//! Payload delivery to the remote collector

use std::time::Duration;
use tracing::trace;

use crate::types::OutboundPayload;
use crate::{RelayError, Result};

/// Header carrying the static collector credential
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Delivers one payload; any failure is a `Transport` error
#[async_trait::async_trait]
pub trait PayloadSender: Send + Sync + 'static {
    async fn send(&self, payload: &OutboundPayload) -> Result<()>;
}

/// HTTP POST delivery with a static API key header
#[derive(Debug, Clone)]
pub struct HttpSender {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    timeout: Duration,
}

impl HttpSender {
    /// Build a sender with a per-request `timeout`
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("databus-relay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RelayError::configuration(format!("cannot build HTTP client: {e}")))?;

        Ok(Self { client, api_url: api_url.into(), api_key: api_key.into(), timeout })
    }

    /// Collector endpoint
    pub fn api_url(&self) -> &str {
        &self.api_url
    }
}

#[async_trait::async_trait]
impl PayloadSender for HttpSender {
    async fn send(&self, payload: &OutboundPayload) -> Result<()> {
        let response = self
            .client
            .post(&self.api_url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RelayError::Timeout { duration: self.timeout }
                } else {
                    RelayError::from(e)
                }
            })?;

        let status = response.status();
        trace!(status = status.as_u16(), drone_id = %payload.drone_id, "Collector responded");
        if status.as_u16() >= 400 {
            return Err(RelayError::http_status(status.as_u16()));
        }
        Ok(())
    }
}
