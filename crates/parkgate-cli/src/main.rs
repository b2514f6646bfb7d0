//! Exit-gate settlement service.
//!
//! Reads its configuration from `PARKGATE_*` environment variables, opens
//! the device link and the ledger, then settles vehicles until Ctrl-C or
//! until the link is lost. Log verbosity follows `RUST_LOG` (default `info`).

use anyhow::Context;
use parkgate_core::{AppConfig, LinkConfig};
use parkgate_link::AnyLink;
use parkgate_settlement::{SessionLoop, SystemClock};
use parkgate_storage::{AnyLedgerStore, Ledger};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env().context("invalid PARKGATE_* configuration")?;
    info!(
        version = parkgate_core::VERSION,
        link = %describe_link(&config.link),
        ledger = %config.ledger.path.display(),
        backend = ?config.ledger.backend,
        rate_per_hour = config.settlement.rate_per_hour,
        "Starting parkgate"
    );

    let store = AnyLedgerStore::open(&config.ledger)
        .await
        .with_context(|| format!("cannot open ledger {}", config.ledger.path.display()))?;
    let ledger = Ledger::open(store).await.context("cannot load ledger")?;
    info!(records = ledger.len(), "Ledger loaded");

    let link = AnyLink::open(&config.link)
        .await
        .with_context(|| format!("cannot open {}", describe_link(&config.link)))?;
    info!(kind = link.kind(), "Device link open");

    let mut session_loop = SessionLoop::new(link, ledger, SystemClock, config.settlement);
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    let result = session_loop.run_until(shutdown).await;
    let stats = serde_json::to_string(&session_loop.stats()).context("cannot encode stats")?;
    info!(%stats, "Settlement loop finished");

    result.context("settlement loop stopped")
}

fn describe_link(link: &LinkConfig) -> String {
    match link {
        LinkConfig::Serial(serial) => format!("serial {} @ {} baud", serial.port, serial.baud_rate),
        LinkConfig::Tcp { addr } => format!("tcp {addr}"),
    }
}
