//! UDP DataBus client

use serde_json::{Map, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, info, trace};

use super::{DataBus, ModuleInfo, RegisterHello};
use crate::codec::WireCodec;
use crate::normalizer::MessageNormalizer;
use crate::types::{FrameOrigin, RawFrame};
use crate::{RelayError, Result};

/// Extra room for a chunk prefix on inbound datagrams
const CHUNK_HEADER_ALLOWANCE: usize = 64;

/// Addresses and limits for the UDP bus client
#[derive(Debug, Clone)]
pub struct UdpBusConfig {
    /// Bus communicator address (`host:port`) that receives the hello
    pub comm_addr: String,
    /// Local address (`host:port`) bound for inbound messages
    pub listen_addr: String,
    /// Largest datagram sent without chunking
    pub max_packet_size: usize,
    /// Longest wait inside one `receive_one` call
    pub receive_timeout: Duration,
}

impl Default for UdpBusConfig {
    fn default() -> Self {
        Self {
            comm_addr: "127.0.0.1:60000".to_string(),
            listen_addr: "0.0.0.0:61233".to_string(),
            max_packet_size: 8192,
            receive_timeout: Duration::from_secs(1),
        }
    }
}

/// DataBus client over a bound UDP socket
pub struct UdpBus {
    config: UdpBusConfig,
    socket: Option<UdpSocket>,
    module: Option<ModuleInfo>,
    filter: Vec<i64>,
    buffer: Vec<u8>,
}

impl UdpBus {
    /// Create an unconnected client
    pub fn new(config: UdpBusConfig) -> Self {
        let buffer = vec![0u8; config.max_packet_size + CHUNK_HEADER_ALLOWANCE];
        Self { config, socket: None, module: None, filter: Vec::new(), buffer }
    }

    /// Local address of the bound socket, once connected
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    /// Active message type filter
    pub fn filter(&self) -> &[i64] {
        &self.filter
    }

    fn socket(&self) -> Result<&UdpSocket> {
        self.socket
            .as_ref()
            .ok_or_else(|| RelayError::transport_failed("UDP bus used before connect"))
    }

    async fn announce(&self) -> Result<()> {
        let Some(module) = &self.module else {
            return Ok(());
        };
        let hello = serde_json::to_vec(&RegisterHello::new(module, &self.filter))?;
        let socket = self.socket()?;

        for datagram in WireCodec::encode_chunks(&hello, self.config.max_packet_size) {
            socket
                .send_to(&datagram, self.config.comm_addr.as_str())
                .await
                .map_err(|e| RelayError::io("sending module hello", e))?;
        }

        debug!(
            module = %module.module_name,
            comm = %self.config.comm_addr,
            bytes = hello.len(),
            "Sent module registration"
        );
        Ok(())
    }

    fn decode_datagram(&self, len: usize) -> Result<Map<String, Value>> {
        let frame = RawFrame::new(self.buffer[..len].to_vec(), FrameOrigin::Socket);
        WireCodec::decode_frame(&frame)
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

#[async_trait::async_trait]
impl DataBus for UdpBus {
    async fn connect(&mut self) -> Result<()> {
        if self.socket.is_some() {
            return Ok(());
        }
        let socket = UdpSocket::bind(self.config.listen_addr.as_str())
            .await
            .map_err(|e| RelayError::io(format!("binding {}", self.config.listen_addr), e))?;
        info!(listen = %socket.local_addr()?, "DataBus UDP socket bound");
        self.socket = Some(socket);
        Ok(())
    }

    async fn register_module(&mut self, module: &ModuleInfo) -> Result<()> {
        self.module = Some(module.clone());
        self.announce().await
    }

    async fn subscribe(&mut self, codes: &[i64]) -> Result<()> {
        for code in codes {
            if !self.filter.contains(code) {
                self.filter.push(*code);
            }
        }
        self.announce().await
    }

    async fn receive_one(&mut self) -> Result<Option<Map<String, Value>>> {
        let socket = self
            .socket
            .as_ref()
            .ok_or_else(|| RelayError::transport_failed("UDP bus used before connect"))?;

        let received =
            tokio::time::timeout(self.config.receive_timeout, socket.recv_from(&mut self.buffer))
                .await;
        let (len, from) = match received {
            Err(_elapsed) => return Ok(None),
            Ok(result) => result.map_err(|e| RelayError::io("receiving bus datagram", e))?,
        };

        trace!(%from, len, "Bus datagram received");
        let message = self.decode_datagram(len)?;

        if !self.accepts(&message) {
            trace!("Message type outside subscription, dropped");
            return Ok(None);
        }
        Ok(Some(message))
    }

    async fn try_receive(&mut self) -> Result<Option<Map<String, Value>>> {
        loop {
            let socket = self
                .socket
                .as_ref()
                .ok_or_else(|| RelayError::transport_failed("UDP bus used before connect"))?;

            let len = match socket.try_recv_from(&mut self.buffer) {
                Ok((len, _from)) => len,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(None),
                Err(e) => return Err(RelayError::io("draining bus datagrams", e)),
            };

            let message = self.decode_datagram(len)?;
            if self.accepts(&message) {
                return Ok(Some(message));
            }
        }
    }
}
