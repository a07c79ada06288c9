//! Advisory node - quorum registry and selection service

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use advisory_node::{
    config::{Args, StorageBackend},
    registry::{MemoryRegistry, QuorumStore, SqliteRegistry},
    server::{self, AppState},
    sweeper::StalenessSweeper,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("advisory_node={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Advisory Node - Quorum Registry");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Storage: {:?}", args.storage);
    info!("Sweep interval: {}s", args.sweep_interval_secs);
    info!("======================================");

    let store: Arc<dyn QuorumStore> = match args.storage {
        StorageBackend::Memory => Arc::new(MemoryRegistry::new()),
        StorageBackend::Sqlite => match SqliteRegistry::open(&args.db_path) {
            Ok(store) => Arc::new(store),
            Err(e) => {
                error!("Failed to open registry database: {}", e);
                std::process::exit(1);
            }
        },
    };

    let sweeper = Arc::new(StalenessSweeper::new(
        Arc::clone(&store),
        Duration::from_secs(args.sweep_interval_secs),
    ));
    Arc::clone(&sweeper).start().await;

    let state = Arc::new(AppState::new(args, store));
    if let Err(e) = server::run(state).await {
        error!("Server error: {:?}", e);
        sweeper.stop().await;
        std::process::exit(1);
    }

    Ok(())
}
