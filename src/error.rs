//! Error types for the advisory node

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    /// Malformed input rejected before touching registry state.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The referenced quorum identifier is not registered.
    #[error("Quorum not found: {0}")]
    NotFound(String),

    /// Selection could not satisfy the requested count under the current
    /// filters. Carries enough detail for the caller to retry with
    /// adjusted parameters.
    #[error(
        "Not enough available quorums with required balance. Found {found}, need {needed} (required balance: {required_balance:.4})"
    )]
    InsufficientCandidates {
        found: usize,
        needed: usize,
        required_balance: f64,
    },

    /// Storage-layer failure (connection loss, constraint violation,
    /// poisoned lock). Unexpected; never silently mapped to an empty result.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<rusqlite::Error> for RegistryError {
    fn from(e: rusqlite::Error) -> Self {
        RegistryError::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;
