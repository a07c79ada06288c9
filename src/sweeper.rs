//! Staleness sweeper
//!
//! Periodic background task demoting quorums that have stopped reporting
//! liveness. The only writer of `available = false` besides explicit
//! unregistration. Records are never deleted: a demoted node self-heals
//! via a later registration or availability confirmation.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::registry::QuorumStore;

/// Default sweep interval
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

pub struct StalenessSweeper {
    store: Arc<dyn QuorumStore>,
    interval: Duration,
    running: Arc<RwLock<bool>>,
}

impl StalenessSweeper {
    pub fn new(store: Arc<dyn QuorumStore>, interval: Duration) -> Self {
        Self {
            store,
            interval,
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Run one sweep, logging instead of propagating storage errors so a
    /// transient failure never kills the loop.
    fn sweep(&self) {
        match self.store.mark_stale() {
            Ok(0) => debug!("Staleness sweep: nothing to demote"),
            Ok(demoted) => info!(demoted, "Staleness sweep demoted silent quorums"),
            Err(e) => error!("Staleness sweep failed (will retry next tick): {e}"),
        }
    }

    /// Start the periodic sweep loop.
    pub async fn start(self: Arc<Self>) {
        {
            let mut running = self.running.write().await;
            if *running {
                warn!("Staleness sweeper already running");
                return;
            }
            *running = true;
        }

        info!("Starting staleness sweeper (interval: {:?})", self.interval);

        let sweeper = Arc::clone(&self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweeper.interval);
            // First tick fires immediately; skip it so a fresh start
            // doesn't demote nodes registered before a restart.
            ticker.tick().await;

            loop {
                ticker.tick().await;

                if !*sweeper.running.read().await {
                    info!("Staleness sweeper stopped");
                    break;
                }

                sweeper.sweep();
            }
        });
    }

    /// Stop the sweeper; the loop exits on its next tick.
    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
        info!("Stopping staleness sweeper");
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }
}
