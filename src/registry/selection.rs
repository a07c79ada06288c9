//! Selection policy shared by both registry backends
//!
//! Turns a candidate set plus a selection request into an ordered subset.
//! Pure: filtering and ranking mutate nothing; assignment bookkeeping is
//! applied by the backend only after the full count is satisfied.

use chrono::{DateTime, Utc};

use crate::error::{RegistryError, Result};
use crate::registry::liveness;
use crate::registry::model::QuorumRecord;

/// Default quorum count applied by the API layer when the caller omits it.
pub const DEFAULT_QUORUM_COUNT: usize = 7;

/// Token classes whose settlement logic requires every independent caller
/// to converge on an identical quorum set.
const CONSISTENCY_CRITICAL_TOKENS: &[&str] = &["TRI"];

/// Ordering mode for a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    /// Least-often/least-recently assigned first; honors the last-char
    /// partition filter.
    Fair,
    /// Identifier-ascending so repeated independent queries converge on
    /// the same set; the last-char filter is ignored here because it
    /// would break determinism.
    Deterministic,
}

impl SelectionMode {
    pub fn for_token(token: Option<&str>) -> Self {
        match token {
            Some(t) if CONSISTENCY_CRITICAL_TOKENS.contains(&t) => Self::Deterministic,
            _ => Self::Fair,
        }
    }
}

/// One selection request.
#[derive(Debug, Clone)]
pub struct SelectionRequest {
    pub count: usize,
    pub transaction_amount: f64,
    /// Token class filter; None means the base settlement token.
    pub token: Option<String>,
    /// Restrict candidates to DIDs ending in this character (Fair mode only).
    pub last_char: Option<char>,
}

impl SelectionRequest {
    pub fn validate(&self) -> Result<()> {
        if self.count == 0 {
            return Err(RegistryError::InvalidInput(
                "quorum count must be a positive integer".into(),
            ));
        }
        if self.transaction_amount <= 0.0 || !self.transaction_amount.is_finite() {
            return Err(RegistryError::InvalidInput(format!(
                "transaction amount must be positive, got {}",
                self.transaction_amount
            )));
        }
        Ok(())
    }

    /// Minimum balance each selected quorum must hold.
    pub fn required_balance(&self) -> f64 {
        self.transaction_amount / self.count as f64
    }

    pub fn mode(&self) -> SelectionMode {
        SelectionMode::for_token(self.token.as_deref())
    }
}

/// Filter and rank candidates, returning exactly `count` records in
/// selection order, or InsufficientCandidates with no side effects.
pub fn choose<'a, I>(candidates: I, req: &SelectionRequest, now: DateTime<Utc>) -> Result<Vec<&'a QuorumRecord>>
where
    I: IntoIterator<Item = &'a QuorumRecord>,
{
    let required_balance = req.required_balance();
    let mode = req.mode();

    let mut eligible: Vec<&QuorumRecord> = candidates
        .into_iter()
        .filter(|q| liveness::is_live(q, now))
        .filter(|q| q.balance >= required_balance)
        .filter(|q| match req.token.as_deref() {
            Some(token) => q.supports_token(token),
            None => true,
        })
        .filter(|q| match (mode, req.last_char) {
            (SelectionMode::Fair, Some(c)) => q.did.ends_with(c),
            _ => true,
        })
        .collect();

    if eligible.len() < req.count {
        return Err(RegistryError::InsufficientCandidates {
            found: eligible.len(),
            needed: req.count,
            required_balance,
        });
    }

    match mode {
        SelectionMode::Deterministic => eligible.sort_by(|a, b| a.did.cmp(&b.did)),
        SelectionMode::Fair => eligible.sort_by(|a, b| {
            a.assignment_count
                .cmp(&b.assignment_count)
                .then_with(|| a.last_assignment.cmp(&b.last_assignment))
        }),
    }

    eligible.truncate(req.count);
    Ok(eligible)
}
