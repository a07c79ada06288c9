//! Quorum registry: entity model, policies, and storage backends
//!
//! Two interchangeable backends honor the same operation contract:
//! [`MemoryRegistry`] (in-process, lock-guarded, non-durable) and
//! [`SqliteRegistry`] (relational, with persisted assignment audit and
//! balance history).

pub mod db;
pub mod liveness;
pub mod memory;
pub mod model;
pub mod schema;
pub mod selection;

use crate::error::Result;
use model::{AssignmentAudit, HealthSummary, QuorumAssignment, QuorumRecord, RegisterRequest};
use selection::SelectionRequest;

pub use db::SqliteRegistry;
pub use memory::MemoryRegistry;

/// Operation contract shared by all registry backends.
///
/// Operations may block briefly on the backend's lock or storage
/// round-trip; none are long-running, and callers impose timeouts
/// externally if desired.
pub trait QuorumStore: Send + Sync {
    /// Register a new quorum or refresh an existing one (upsert by DID).
    /// Always re-arms availability and refreshes the last ping.
    fn register(&self, req: &RegisterRequest) -> Result<()>;

    /// Mark an existing quorum available and refresh its last ping.
    fn confirm_availability(&self, did: &str) -> Result<()>;

    /// Refresh the last ping of an existing quorum. Does not touch the
    /// availability flag.
    fn heartbeat(&self, did: &str) -> Result<()>;

    /// Set a new non-negative balance for an existing quorum.
    fn update_balance(&self, did: &str, new_balance: f64) -> Result<()>;

    /// Remove a quorum and its secondary-index entry.
    fn unregister(&self, did: &str) -> Result<()>;

    /// Select `req.count` eligible quorums, atomically applying assignment
    /// bookkeeping. All-or-nothing: on failure no record is mutated and
    /// no audit entry is written.
    fn select(&self, req: &SelectionRequest) -> Result<Vec<QuorumAssignment>>;

    /// Snapshot of a single quorum.
    fn get(&self, did: &str) -> Result<QuorumRecord>;

    /// Snapshots of all registered quorums.
    fn list(&self) -> Result<Vec<QuorumRecord>>;

    /// Total and currently-live counts.
    fn health(&self) -> Result<HealthSummary>;

    /// Most recent selection audit entries, newest first. The volatile
    /// backend keeps no audit log and returns an empty list.
    fn transaction_history(&self, limit: usize) -> Result<Vec<AssignmentAudit>>;

    /// Demote quorums silent past the stale threshold; returns the number
    /// demoted. Records are never deleted by staleness.
    fn mark_stale(&self) -> Result<usize>;
}
