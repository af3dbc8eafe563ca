pub mod address;
pub mod config;
pub mod constants;
pub mod error;
pub mod node;
pub mod payouts;
pub mod reward;
pub mod storage;
pub mod types;
pub mod units;
pub mod unlocker;

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use node::NodeClient;
use payouts::PayoutsProcessor;
use storage::{LedgerStore, MemoryLedger, SledLedger};
use unlocker::BlockUnlocker;

/// Cadence of the node liveness probe.
const HEALTH_CHECK_SECS: u64 = 60;

#[derive(Parser, Debug)]
#[command(name = "sero-poold")]
#[command(about = "SERO mining pool back-office daemon", long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[arg(short, long)]
    verbose: bool,

    /// Write a default config file and exit
    #[arg(long)]
    generate_config: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if args.generate_config {
        let config = Config::default();
        if let Err(e) = config.save_to_file(&args.config) {
            eprintln!("Failed to write config to {}: {e}", args.config);
            std::process::exit(1);
        }
        println!("Wrote default config to {}", args.config);
        return;
    }

    let config = match Config::load_from_file(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Cannot load config {}: {e}", args.config);
            std::process::exit(1);
        }
    };

    let level = if args.verbose {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🚀 Starting {}", config.node.name);

    let store: Arc<dyn LedgerStore> = match config.storage.backend.as_str() {
        "memory" => {
            warn!("⚠️  Using the in-memory ledger: state is lost on exit");
            Arc::new(MemoryLedger::new())
        }
        _ => match SledLedger::open(&config.storage.data_dir) {
            Ok(ledger) => {
                info!("Opened ledger at {}", config.storage.data_dir);
                Arc::new(ledger)
            }
            Err(e) => {
                error!("Failed to open ledger at {}: {e}", config.storage.data_dir);
                std::process::exit(1);
            }
        },
    };

    let mut watched_nodes: Vec<Arc<NodeClient>> = Vec::new();

    if config.unlocker.enabled {
        let node = match NodeClient::new(
            "BlockUnlocker",
            &config.unlocker.daemon,
            Duration::from_secs(config.unlocker.timeout_secs),
        ) {
            Ok(n) => Arc::new(n),
            Err(e) => {
                error!("Failed to set up unlocker RPC client: {e}");
                std::process::exit(1);
            }
        };
        watched_nodes.push(node.clone());

        match BlockUnlocker::new(&config.unlocker, store.clone(), node) {
            Ok(unlocker) => unlocker.start(),
            Err(e) => {
                error!("Failed to start block unlocker: {e}");
                std::process::exit(1);
            }
        }
    }

    if config.payouts.enabled {
        let node = match NodeClient::new(
            "PayoutsProcessor",
            &config.payouts.daemon,
            Duration::from_secs(config.payouts.timeout_secs),
        ) {
            Ok(n) => Arc::new(n),
            Err(e) => {
                error!("Failed to set up payouts RPC client: {e}");
                std::process::exit(1);
            }
        };
        watched_nodes.push(node.clone());

        match PayoutsProcessor::new(&config.payouts, store.clone(), node) {
            Ok(processor) => processor.start(),
            Err(e) => {
                error!("Failed to start payouts processor: {e}");
                std::process::exit(1);
            }
        }
    }

    if !watched_nodes.is_empty() {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(HEALTH_CHECK_SECS)).await;
                for node in &watched_nodes {
                    if !node.check().await {
                        warn!("🛑 Node behind {} is sick or unreachable", node.name());
                    }
                }
            }
        });
    }

    // Critical sections have no cooperative cancellation; the recovery
    // anchors in the ledger cover a hard kill.
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
        return;
    }
    info!("🛑 Shutdown signal received");
}
