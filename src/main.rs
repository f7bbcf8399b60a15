//! Crash game server binary
//!
//! Boots the round engine, starts the round driver and serves the HTTP and
//! WebSocket API until Ctrl+C / SIGTERM.

use clap::Parser;
use crash_engine::{
    api::{ApiServer, WebSocketManager},
    config::{ConfigLoader, StorageBackendKind},
    driver::RoundDriver,
    games::{crash_policy, RoundEngine},
    storage::open_backend,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "crash-engine")]
#[command(about = "Multiplayer crash game round server", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(long, short)]
    config: Option<String>,

    /// API server host
    #[arg(long)]
    host: Option<String>,

    /// API server port
    #[arg(long)]
    port: Option<u16>,

    /// Database directory
    #[arg(long)]
    data_dir: Option<String>,

    /// Keep all state in memory (nothing survives a restart)
    #[arg(long)]
    memory: bool,

    /// Write the effective configuration to this path and exit
    #[arg(long)]
    dump_config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let loader = match &args.config {
        Some(path) => ConfigLoader::new().with_path(path),
        None => ConfigLoader::new(),
    };
    let mut config = loader.load()?;

    if let Some(host) = args.host {
        config.api.host = host;
    }
    if let Some(port) = args.port {
        config.api.port = port;
    }
    if let Some(data_dir) = args.data_dir {
        config.storage.data_directory = data_dir;
    }
    if args.memory {
        config.storage.backend = StorageBackendKind::Memory;
    }
    config.validate()?;

    if let Some(path) = args.dump_config {
        loader.save(&config, &path)?;
        println!("Configuration written to {}", path);
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.monitoring.log_filter)),
        )
        .init();

    info!("🚀 Starting crash game server");
    info!(
        "📂 Storage: {:?} ({})",
        config.storage.backend, config.storage.data_directory
    );

    let store = open_backend(&config.storage)?;
    let policy = crash_policy::from_config(&config.crash_policy);
    let engine = Arc::new(RoundEngine::bootstrap(&config, store, policy)?);
    let websocket_manager = Arc::new(WebSocketManager::new(config.api.broadcast_capacity));

    let driver = RoundDriver::new(
        engine.clone(),
        websocket_manager.clone(),
        config.tick_interval(),
    )
    .spawn();

    let result = ApiServer::new(config.api.clone(), engine, websocket_manager)
        .run()
        .await;

    driver.shutdown().await;
    info!("👋 Shutdown complete");

    result
}
