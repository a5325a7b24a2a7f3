//! DataBus adapters.
//!
//! The relay talks to the vehicle bus through one explicit interface,
//! [`DataBus`]. A single implementation is chosen at startup from
//! configuration:
//!
//! - [`UdpBus`]: binds the listen port, registers as a module with the bus
//!   communicator and receives datagrams directly
//! - [`SniffBus`]: passively recovers datagrams from captured frames when the
//!   listen port is owned by another process

mod sniff;
mod udp;

pub use sniff::SniffBus;
pub use udp::{UdpBus, UdpBusConfig};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::Result;

/// Module class announced for a generic bus client
pub const MODULE_CLASS_GENERIC: &str = "MODULE_CLASS_GENERIC";
/// Feature flag: the module consumes telemetry
pub const FEATURE_RECEIVING_TELEMETRY: &str = "MODULE_FEATURE_RECEIVING_TELEMETRY";

/// Identity a module announces when registering on the bus
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleInfo {
    pub module_class: String,
    pub module_name: String,
    pub module_key: String,
    pub module_version: String,
    #[serde(skip)]
    pub features: Vec<String>,
}

impl ModuleInfo {
    /// A generic telemetry-receiving module named `module_name`
    pub fn telemetry_receiver(module_name: impl Into<String>) -> Self {
        Self {
            module_class: MODULE_CLASS_GENERIC.to_string(),
            module_name: module_name.into(),
            module_key: generate_module_key(),
            module_version: env!("CARGO_PKG_VERSION").to_string(),
            features: vec![FEATURE_RECEIVING_TELEMETRY.to_string()],
        }
    }
}

/// Registration hello sent to the bus communicator
#[derive(Debug, Serialize)]
pub(crate) struct RegisterHello<'a> {
    pub event: &'static str,
    pub module: &'a ModuleInfo,
    pub features: &'a [String],
    pub message_filter: &'a [i64],
}

impl<'a> RegisterHello<'a> {
    pub fn new(module: &'a ModuleInfo, message_filter: &'a [i64]) -> Self {
        Self { event: "register", module, features: &module.features, message_filter }
    }
}

/// Connection to the vehicle DataBus
///
/// Implementations bound every blocking wait (on the order of one second) so
/// callers can observe cancellation between calls.
#[async_trait::async_trait]
pub trait DataBus: Send + 'static {
    /// Open the underlying transport
    async fn connect(&mut self) -> Result<()>;

    /// Announce this module to the bus
    async fn register_module(&mut self, module: &ModuleInfo) -> Result<()>;

    /// Restrict delivery to the given message type codes
    ///
    /// An empty list accepts every message type.
    async fn subscribe(&mut self, codes: &[i64]) -> Result<()>;

    /// Receive one decoded message
    ///
    /// Returns:
    /// - `Ok(Some(message))` - A JSON object arrived
    /// - `Ok(None)` - Nothing arrived within the receive window
    /// - `Err(e)` - A malformed message (`Parse`/`Schema`) or transport failure
    async fn receive_one(&mut self) -> Result<Option<Map<String, Value>>>;

    /// Take one already-queued message without waiting
    ///
    /// Messages outside the subscription are consumed and passed over.
    /// `Ok(None)` means nothing more is queued right now.
    async fn try_receive(&mut self) -> Result<Option<Map<String, Value>>>;
}

fn generate_module_key() -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("{:012}", nanos % 1_000_000_000_000)
}
