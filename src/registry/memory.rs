//! Volatile in-memory registry backend
//!
//! All records live in a lock-guarded map keyed by DID, with a secondary
//! index from peer handle to DID for fast lookup. A single exclusive lock
//! serializes every mutation and every selection (selection mutates, so it
//! cannot run under a shared lock), making selection linearizable with
//! respect to registration, heartbeat, and unregistration. No durability:
//! process restart loses all state.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::{RegistryError, Result};
use crate::registry::model::{
    format_uptime, AssignmentAudit, HealthSummary, QuorumAssignment, QuorumRecord, RegisterRequest,
};
use crate::registry::selection::{self, SelectionRequest};
use crate::registry::{liveness, QuorumStore};

#[derive(Default)]
struct Inner {
    /// Key: DID
    quorums: HashMap<String, QuorumRecord>,
    /// Key: peer handle, value: DID. Maintained for lookup, not selection.
    peer_index: HashMap<String, String>,
}

pub struct MemoryRegistry {
    inner: RwLock<Inner>,
    start_time: DateTime<Utc>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            start_time: Utc::now(),
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| RegistryError::Storage("registry lock poisoned".into()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| RegistryError::Storage("registry lock poisoned".into()))
    }

    /// Look up a DID by peer handle via the secondary index.
    pub fn did_for_peer(&self, peer_id: &str) -> Result<Option<String>> {
        Ok(self.read()?.peer_index.get(peer_id).cloned())
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl QuorumStore for MemoryRegistry {
    fn register(&self, req: &RegisterRequest) -> Result<()> {
        req.validate()?;
        let now = Utc::now();
        let mut guard = self.write()?;
        let inner = &mut *guard;

        if let Some(existing) = inner.quorums.get_mut(&req.did) {
            let old_peer = existing.peer_id.clone();
            existing.peer_id = req.peer_id.clone();
            existing.balance = req.balance;
            existing.node_type = req.node_type;
            existing.available = true;
            existing.last_ping = now;
            existing.supported_tokens = req.supported_tokens.clone();

            if old_peer != req.peer_id {
                inner.peer_index.remove(&old_peer);
            }
            inner.peer_index.insert(req.peer_id.clone(), req.did.clone());
            debug!(did = %req.did, "Refreshed existing quorum registration");
            return Ok(());
        }

        inner.quorums.insert(
            req.did.clone(),
            QuorumRecord {
                did: req.did.clone(),
                peer_id: req.peer_id.clone(),
                balance: req.balance,
                node_type: req.node_type,
                available: true,
                last_ping: now,
                assignment_count: 0,
                last_assignment: None,
                registration_time: now,
                supported_tokens: req.supported_tokens.clone(),
            },
        );
        inner.peer_index.insert(req.peer_id.clone(), req.did.clone());
        info!(did = %req.did, peer = %req.peer_id, "Registered new quorum");
        Ok(())
    }

    fn confirm_availability(&self, did: &str) -> Result<()> {
        let mut inner = self.write()?;
        let quorum = inner
            .quorums
            .get_mut(did)
            .ok_or_else(|| RegistryError::NotFound(did.to_string()))?;
        quorum.available = true;
        quorum.last_ping = Utc::now();
        Ok(())
    }

    fn heartbeat(&self, did: &str) -> Result<()> {
        let mut inner = self.write()?;
        let quorum = inner
            .quorums
            .get_mut(did)
            .ok_or_else(|| RegistryError::NotFound(did.to_string()))?;
        quorum.last_ping = Utc::now();
        Ok(())
    }

    fn update_balance(&self, did: &str, new_balance: f64) -> Result<()> {
        if new_balance < 0.0 || !new_balance.is_finite() {
            return Err(RegistryError::InvalidInput(format!(
                "balance must be non-negative, got {new_balance}"
            )));
        }
        let mut inner = self.write()?;
        let quorum = inner
            .quorums
            .get_mut(did)
            .ok_or_else(|| RegistryError::NotFound(did.to_string()))?;
        quorum.balance = new_balance;
        Ok(())
    }

    fn unregister(&self, did: &str) -> Result<()> {
        let mut inner = self.write()?;
        let quorum = inner
            .quorums
            .remove(did)
            .ok_or_else(|| RegistryError::NotFound(did.to_string()))?;
        inner.peer_index.remove(&quorum.peer_id);
        info!(did = %did, "Unregistered quorum");
        Ok(())
    }

    fn select(&self, req: &SelectionRequest) -> Result<Vec<QuorumAssignment>> {
        req.validate()?;
        let now = Utc::now();
        let mut inner = self.write()?;

        let chosen = selection::choose(inner.quorums.values(), req, now)?;
        let assignments: Vec<QuorumAssignment> =
            chosen.iter().map(|q| QuorumAssignment::new(q)).collect();
        let dids: Vec<String> = chosen.iter().map(|q| q.did.clone()).collect();

        for did in &dids {
            // choose() only returns records present in the map
            if let Some(quorum) = inner.quorums.get_mut(did) {
                quorum.assignment_count += 1;
                quorum.last_assignment = Some(now);
            }
        }

        debug!(count = assignments.len(), "Selected quorums");
        Ok(assignments)
    }

    fn get(&self, did: &str) -> Result<QuorumRecord> {
        self.read()?
            .quorums
            .get(did)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(did.to_string()))
    }

    fn list(&self) -> Result<Vec<QuorumRecord>> {
        Ok(self.read()?.quorums.values().cloned().collect())
    }

    fn health(&self) -> Result<HealthSummary> {
        let now = Utc::now();
        let inner = self.read()?;
        let available = inner
            .quorums
            .values()
            .filter(|q| liveness::is_live(q, now))
            .count();
        Ok(HealthSummary {
            status: "healthy",
            total_quorums: inner.quorums.len(),
            available_quorums: available,
            uptime: format_uptime(now - self.start_time),
            last_check: now,
        })
    }

    fn transaction_history(&self, _limit: usize) -> Result<Vec<AssignmentAudit>> {
        // No audit log in the volatile backend.
        Ok(Vec::new())
    }

    fn mark_stale(&self) -> Result<usize> {
        let now = Utc::now();
        let mut inner = self.write()?;
        let mut demoted = 0;
        for quorum in inner.quorums.values_mut() {
            if quorum.available && liveness::is_stale(quorum.last_ping, now) {
                quorum.available = false;
                demoted += 1;
            }
        }
        Ok(demoted)
    }
}
