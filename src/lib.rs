//! Vehicle DataBus telemetry relay.
//!
//! Acquires telemetry from a vehicle bus (as a registered UDP module or by
//! passively sniffing its traffic), folds heterogeneous messages into one
//! aggregate state, and forwards a compact JSON payload to an HTTP endpoint
//! at a fixed rate with exponential backoff while the endpoint is down.
//!
//! # Pipeline
//!
//! ```text
//! DataBus -> WireCodec -> MessageNormalizer -> TelemetryAggregator
//!         -> PayloadMapper -> SendLoop -> HttpSender
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use databus_relay::{Relay, RelayConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> databus_relay::Result<()> {
//!     let config = RelayConfig::from_env()?;
//!     let stats = Relay::run(&config, CancellationToken::new()).await?;
//!     println!("sent {} payloads", stats.sent);
//!     Ok(())
//! }
//! ```

pub mod aggregator;
pub mod bus;
pub mod codec;
pub mod config;
mod error;
mod fields;
pub mod mapper;
pub mod normalizer;
pub mod provider;
pub mod providers;
pub mod send_loop;
pub mod sender;
pub mod sniffer;
pub mod types;

pub use aggregator::TelemetryAggregator;
pub use bus::{DataBus, ModuleInfo, SniffBus, UdpBus, UdpBusConfig};
pub use codec::WireCodec;
pub use config::{DataSource, RelayConfig};
pub use error::*;
pub use mapper::PayloadMapper;
pub use normalizer::MessageNormalizer;
pub use provider::PayloadSource;
pub use providers::{BusSource, FeedSource};
pub use send_loop::{Backoff, LoopState, LoopStats, SendLoop};
pub use sender::{HttpSender, PayloadSender};
pub use types::*;

use tokio_util::sync::CancellationToken;
use tracing::info;

/// Entry point wiring a configured source to the HTTP sender.
pub struct Relay;

impl Relay {
    /// Run the relay described by `config` until `cancel` fires.
    ///
    /// The bus source is chosen from [`RelayConfig::source`]. Returns the
    /// loop counters on shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The configuration is invalid
    /// - Sniff mode lacks capture privileges or the platform has no raw capture
    /// - The HTTP client cannot be built
    pub async fn run(config: &RelayConfig, cancel: CancellationToken) -> Result<LoopStats> {
        config.validate()?;
        let sender = HttpSender::new(&config.api_url, &config.api_key, config.http_timeout)?;
        let mapper = PayloadMapper::new(&config.drone_id);

        info!(
            drone_id = %config.drone_id,
            source = ?config.source,
            api_url = %sender.api_url(),
            "Starting relay"
        );

        match config.source {
            DataSource::Bus => {
                let bus = UdpBus::new(config.udp_bus_config());
                let source =
                    BusSource::new(bus, mapper, config.module_info(), config.message_filter.clone());
                Self::drive(source, sender, config, cancel).await
            }
            DataSource::Sniff => {
                let bus =
                    SniffBus::open(&config.sniff_interface, config.sniff_port(), config.sniff_timeout)?;
                let source =
                    BusSource::new(bus, mapper, config.module_info(), config.message_filter.clone());
                Self::drive(source, sender, config, cancel).await
            }
        }
    }

    /// Run an arbitrary source against an arbitrary sender with the configured pacing
    pub async fn drive<P, S>(
        source: P,
        sender: S,
        config: &RelayConfig,
        cancel: CancellationToken,
    ) -> Result<LoopStats>
    where
        P: PayloadSource,
        S: PayloadSender,
    {
        SendLoop::new(source, sender, config.send_interval(), config.offline_backoff)
            .run(cancel)
            .await
    }
}
