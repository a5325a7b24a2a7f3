use anyhow::Context;
use databus_relay::{Relay, RelayConfig};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = RelayConfig::from_env().context("invalid relay configuration")?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("invalid LOG_LEVEL")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, shutting down");
                shutdown.cancel();
            }
            Err(e) => error!("Cannot listen for interrupt: {}", e),
        }
    });

    match Relay::run(&config, cancel).await {
        Ok(stats) => {
            info!(sent = stats.sent, failed = stats.failed, "Relay stopped");
            Ok(())
        }
        Err(e) => {
            error!("Relay failed: {}", e);
            for suggestion in e.recovery_suggestions() {
                error!("  - {}", suggestion);
            }
            Err(e.into())
        }
    }
}
