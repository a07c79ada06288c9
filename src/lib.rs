//! Advisory node - quorum registry and selection engine
//!
//! Quorum nodes periodically advertise liveness and spendable balance;
//! client nodes query the registry for a set of currently-eligible nodes
//! to co-sign or validate a transaction of a given amount.
//!
//! ## Services
//!
//! - **Registry**: registration, heartbeat, and availability tracking for
//!   quorum nodes, with volatile and SQLite-backed storage backends
//! - **Selection**: balance-validated, token-filtered quorum selection
//!   with fair-rotation or deterministic ordering
//! - **Sweeper**: background demotion of nodes that stop reporting

pub mod config;
pub mod error;
pub mod registry;
pub mod routes;
pub mod server;
pub mod sweeper;

pub use config::Args;
pub use error::{RegistryError, Result};
pub use server::AppState;
