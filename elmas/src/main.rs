//! ELMAS node
//!
//! Loads configuration, opens storage and serves the Mini App API and bot
//! webhook until Ctrl-C.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use elmas::config::{load_configuration, CliArgs, NodeConfig};
use elmas::ElmasNode;
use lib_storage::{MemoryBackend, SledBackend, StorageBackend};
use lib_types::SystemClock;

/// ELMAS rewarded-ad node
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(name = "elmas")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "ELMAS_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory for the sled database
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// HTTP port
    #[arg(short, long)]
    port: Option<u16>,

    /// Log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Keep all state in memory (nothing survives a restart)
    #[arg(long)]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = CliArgs {
        config: cli.config,
        data_dir: cli.data_dir,
        port: cli.port,
        in_memory: cli.in_memory,
    };
    let config = load_configuration(&args).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            return;
        }
        info!("Shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    if config.storage.in_memory {
        info!("Using in-memory storage");
        run(Arc::new(MemoryBackend::new()), config, shutdown_rx).await
    } else {
        let path = config.storage.data_dir.join("elmas.db");
        std::fs::create_dir_all(&config.storage.data_dir)
            .with_context(|| format!("failed to create {}", config.storage.data_dir.display()))?;
        let db = SledBackend::open_with_config(&path, config.storage.cache_capacity_bytes)
            .with_context(|| format!("failed to open {}", path.display()))?;
        let tree = db.open_tree(&config.storage.tree)?;
        info!("Opened sled tree '{}' at {}", tree.name(), path.display());

        let result = run(Arc::new(tree), config, shutdown_rx).await;
        db.flush_sync().context("final flush failed")?;
        result
    }
}

async fn run<B: StorageBackend + 'static>(
    backend: Arc<B>,
    config: NodeConfig,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let node = ElmasNode::new(backend, Arc::new(SystemClock), config)?;
    node.run(shutdown).await
}
