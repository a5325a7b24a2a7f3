//! Passive DataBus client backed by packet capture

use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, info};

use super::{DataBus, ModuleInfo};
use crate::normalizer::MessageNormalizer;
use crate::sniffer::{FrameSource, PacketSniffer, RawCapture};
use crate::{RelayError, Result};

/// Capture window for frames already in flight when draining
const DRAIN_WINDOW: Duration = Duration::from_millis(1);

/// DataBus client that observes traffic instead of owning the listen port.
///
/// Nothing is sent on the bus; registration and subscription only shape
/// local filtering.
pub struct SniffBus<S: FrameSource = RawCapture> {
    sniffer: Option<PacketSniffer<S>>,
    timeout: Duration,
    filter: Vec<i64>,
}

impl SniffBus<RawCapture> {
    /// Open a raw capture on `interface` watching UDP `port`.
    ///
    /// Fails fast with `Configuration` when capture privileges are missing.
    pub fn open(interface: &str, port: u16, timeout: Duration) -> Result<Self> {
        Ok(Self::new(PacketSniffer::open(interface, port)?, timeout))
    }
}

impl<S: FrameSource> SniffBus<S> {
    /// Wrap an existing sniffer; `timeout` bounds each `receive_one`
    pub fn new(sniffer: PacketSniffer<S>, timeout: Duration) -> Self {
        Self { sniffer: Some(sniffer), timeout, filter: Vec::new() }
    }
}

#[async_trait::async_trait]
impl<S: FrameSource> DataBus for SniffBus<S> {
    async fn connect(&mut self) -> Result<()> {
        if let Some(sniffer) = &self.sniffer {
            info!(port = sniffer.port(), "Sniffing DataBus traffic");
        }
        Ok(())
    }

    async fn register_module(&mut self, module: &ModuleInfo) -> Result<()> {
        debug!(module = %module.module_name, "Passive mode, module registration not sent");
        Ok(())
    }

    async fn subscribe(&mut self, codes: &[i64]) -> Result<()> {
        for code in codes {
            if !self.filter.contains(code) {
                self.filter.push(*code);
            }
        }
        Ok(())
    }

    async fn receive_one(&mut self) -> Result<Option<Map<String, Value>>> {
        let Some(message) = self.sniff(self.timeout).await? else {
            return Ok(None);
        };
        Ok(self.accepts(&message).then_some(message))
    }

    async fn try_receive(&mut self) -> Result<Option<Map<String, Value>>> {
        while let Some(message) = self.sniff(DRAIN_WINDOW).await? {
            if self.accepts(&message) {
                return Ok(Some(message));
            }
        }
        Ok(None)
    }
}

impl<S: FrameSource> SniffBus<S> {
    /// Run one blocking sniff of at most `window` off the async runtime
    async fn sniff(&mut self, window: Duration) -> Result<Option<Map<String, Value>>> {
        let mut sniffer = self
            .sniffer
            .take()
            .ok_or_else(|| RelayError::transport_failed("packet sniffer lost after a failed read"))?;

        let (sniffer, result) = tokio::task::spawn_blocking(move || {
            let result = sniffer.sniff_one(window);
            (sniffer, result)
        })
        .await
        .map_err(|e| RelayError::io("joining sniffer task", std::io::Error::other(e)))?;
        self.sniffer = Some(sniffer);
        result
    }

    fn accepts(&self, message: &Map<String, Value>) -> bool {
        if self.filter.is_empty() {
            return true;
        }
        match MessageNormalizer::resolve_type(message) {
            Some(code) => self.filter.contains(&code),
            None => true,
        }
    }
}
