//! HTTP server wiring

mod http;

pub use http::run;

use std::sync::Arc;

use crate::config::Args;
use crate::registry::QuorumStore;

/// Shared application state handed to every request handler.
pub struct AppState {
    pub args: Args,
    pub store: Arc<dyn QuorumStore>,
}

impl AppState {
    pub fn new(args: Args, store: Arc<dyn QuorumStore>) -> Self {
        Self { args, store }
    }
}
