//! Configuration for the advisory node
//!
//! CLI arguments and environment variable handling using clap.

use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Registry storage backend selection
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// In-process map; fastest, lost on restart
    Memory,
    /// SQLite-backed with assignment audit and balance history
    Sqlite,
}

/// Advisory node - quorum registry and selection service
#[derive(Parser, Debug, Clone)]
#[command(name = "advisory-node")]
#[command(about = "Quorum registry and selection service for distributed-ledger consensus")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Registry storage backend
    #[arg(long, env = "STORAGE_BACKEND", value_enum, default_value_t = StorageBackend::Memory)]
    pub storage: StorageBackend,

    /// SQLite database path (sqlite backend only)
    #[arg(long, env = "DB_PATH", default_value = "advisory_node.db")]
    pub db_path: PathBuf,

    /// Staleness sweep interval in seconds
    #[arg(long, env = "SWEEP_INTERVAL_SECS", default_value = "300")]
    pub sweep_interval_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.sweep_interval_secs == 0 {
            return Err("SWEEP_INTERVAL_SECS must be positive".to_string());
        }
        Ok(())
    }
}
