//! # vt-runner
//!
//! Replays recorded ticks through the simulated trading terminal.
//!
//! Loads a JSON configuration file, starts the engine worker and the
//! simulation gateway, subscribes every configured instrument, optionally
//! submits a batch of orders, and logs every bar and order update until
//! Ctrl+C.
//!
//! # Usage
//!
//! ```bash
//! vt-runner config.json --log-level info --orders orders.json
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error, info, warn};
use vt_core::{ConnectionStatus, OrderRequest};
use vt_md::source::JsonLinesSource;
use vt_td::Gateway;
use vt_td::engine::MatchingEngine;
use vt_td::ledger::Ledger;
use vt_td::simulation::{SimulationGateway, SimulationSettings};

/// Simulated trading terminal runner.
#[derive(Parser)]
#[command(name = "vt-runner", about = "Simulated trading terminal: tick replay and order matching")]
struct Cli {
    /// Configuration file path (JSON).
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Optional log directory for file output.
    #[arg(long)]
    log_dir: Option<String>,

    /// JSON array of orders submitted right after connecting.
    #[arg(long)]
    orders: Option<PathBuf>,
}

fn load_orders(path: &Path) -> Result<Vec<OrderRequest>> {
    let content = std::fs::read_to_string(path).with_context(|| format!("read orders {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parse orders {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load configuration (needed for the log file prefix)
    let config = vt_core::config::load_config(&cli.config)?;

    // 2. Initialize logging
    let log_dir = cli.log_dir.clone().or_else(|| config.log_path());
    vt_core::logging::init_logging(&cli.log_level, log_dir.as_deref(), &config.module_name());

    info!(
        "vt-runner starting: config={}, log_level={}, {} instrument(s)",
        cli.config.display(),
        cli.log_level,
        config.instruments.len()
    );

    // 3. Engine worker
    let ledger = Ledger::new(&config.account.effective_name(), config.account.balance);
    let (events, mut rx) = vt_td::event::channels();
    let (engine, worker) = vt_td::worker::spawn(
        MatchingEngine::new(ledger),
        events,
        config.engine.cpu_core,
        config.engine.effective_queue_capacity(),
    )?;

    // 4. Gateway over the recorded ticks
    let source_dir = config.replay.source_dir.clone().unwrap_or_else(|| ".".into());
    let source = Arc::new(JsonLinesSource::new(&source_dir));
    let mut gateway = SimulationGateway::new(SimulationSettings::from_config(&config), engine.clone(), source);
    let mut status = gateway.status();

    let connected = gateway.connect().await?;
    info!("gateway '{}' {connected:?}, ticks from {source_dir}", gateway.name());

    for instrument in &config.instruments {
        gateway.subscribe(&instrument.name).await?;
    }

    // 5. Optional order batch
    if let Some(path) = &cli.orders {
        let orders = load_orders(path)?;
        let resp = gateway.create_orders(orders).await?;
        if resp.is_accepted() {
            info!("submitted {} order(s)", resp.orders.len());
        } else {
            for e in &resp.errors {
                error!("order rejected: {e}");
            }
        }
    }

    info!("replaying, press Ctrl+C to stop");

    // 6. Event loop
    loop {
        tokio::select! {
            Some(update) = rx.points.recv() => {
                debug!("[{}] bar #{} {}", update.instrument, update.index, update.point);
            }
            Some(update) = rx.orders.recv() => {
                match serde_json::to_string(&update) {
                    Ok(json) => info!("order update: {json}"),
                    Err(e) => warn!("order update not serializable: {e}"),
                }
            }
            Ok(()) = status.changed() => {
                let current = *status.borrow_and_update();
                if current == ConnectionStatus::Faulted {
                    warn!("gateway faulted, replay stopped for at least one instrument");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    // 7. Shutdown
    gateway.disconnect().await?;
    let account = gateway.account().await?;
    info!("final account: {}", serde_json::to_string(&account)?);
    for position in gateway.positions().await? {
        info!("open position: {}", serde_json::to_string(&position)?);
    }

    engine.shutdown()?;
    if tokio::task::spawn_blocking(move || worker.join()).await?.is_err() {
        error!("engine worker panicked");
    }

    info!("goodbye");
    Ok(())
}
