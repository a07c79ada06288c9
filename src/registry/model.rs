//! Entity model for registered quorum nodes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Highest valid node type tag. Types are a small closed set {0..4}
/// mirroring the DID modes of the ledger platform.
pub const MAX_NODE_TYPE: u8 = 4;

/// Type tag reported for selected quorums (private-subnet quorum class).
pub const PRIVATE_SUBNET_TYPE: u8 = 2;

/// Base settlement token. A record with an empty supported-token set is
/// treated as supporting only this token.
pub const BASE_TOKEN: &str = "RBT";

/// One registered quorum node, keyed by DID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuorumRecord {
    pub did: String,
    /// Network-reachable peer handle; updated on every registration.
    pub peer_id: String,
    /// Spendable balance in monetary units; never negative.
    pub balance: f64,
    pub node_type: u8,
    /// Visibility to selection. Set true by registration/confirmation,
    /// set false only by the staleness sweeper or unregistration.
    pub available: bool,
    /// Most recent liveness signal.
    pub last_ping: DateTime<Utc>,
    /// Incremented exactly once per successful selection including this node.
    pub assignment_count: u64,
    /// None means never assigned; sorts before any assigned timestamp.
    pub last_assignment: Option<DateTime<Utc>>,
    /// Set once at first registration, never mutated.
    pub registration_time: DateTime<Utc>,
    #[serde(default)]
    pub supported_tokens: Vec<String>,
}

impl QuorumRecord {
    /// Whether this node declares support for the given token class.
    pub fn supports_token(&self, token: &str) -> bool {
        if self.supported_tokens.is_empty() {
            return token == BASE_TOKEN;
        }
        self.supported_tokens.iter().any(|t| t == token)
    }
}

/// Registration input (upsert-by-DID semantics).
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub did: String,
    pub peer_id: String,
    #[serde(default)]
    pub balance: f64,
    #[serde(alias = "did_type")]
    pub node_type: u8,
    #[serde(default)]
    pub supported_tokens: Vec<String>,
}

impl RegisterRequest {
    /// Reject malformed input before it touches registry state.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.balance < 0.0 || !self.balance.is_finite() {
            return Err(crate::error::RegistryError::InvalidInput(format!(
                "balance must be non-negative, got {}",
                self.balance
            )));
        }
        if self.node_type > MAX_NODE_TYPE {
            return Err(crate::error::RegistryError::InvalidInput(format!(
                "node type must be 0..={}, got {}",
                MAX_NODE_TYPE, self.node_type
            )));
        }
        Ok(())
    }
}

/// One selected quorum, projected for the consensus caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumAssignment {
    #[serde(rename = "type")]
    pub type_tag: u8,
    /// Format: "peer_id.did"
    pub address: String,
}

impl QuorumAssignment {
    pub fn new(record: &QuorumRecord) -> Self {
        Self {
            type_tag: PRIVATE_SUBNET_TYPE,
            address: format!("{}.{}", record.peer_id, record.did),
        }
    }
}

/// Health summary of the registry.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSummary {
    pub status: &'static str,
    pub total_quorums: usize,
    pub available_quorums: usize,
    pub uptime: String,
    pub last_check: DateTime<Utc>,
}

/// Render an uptime duration as "1h2m3s".
pub fn format_uptime(elapsed: chrono::Duration) -> String {
    let secs = elapsed.num_seconds().max(0);
    format!("{}h{}m{}s", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Append-only audit entry for one successful selection (durable backend).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentAudit {
    pub transaction_id: String,
    pub transaction_amount: f64,
    pub required_balance: f64,
    pub quorum_dids: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with_tokens(tokens: &[&str]) -> QuorumRecord {
        QuorumRecord {
            did: "d".into(),
            peer_id: "p".into(),
            balance: 0.0,
            node_type: 0,
            available: true,
            last_ping: Utc::now(),
            assignment_count: 0,
            last_assignment: None,
            registration_time: Utc::now(),
            supported_tokens: tokens.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn empty_token_set_means_base_token_only() {
        let rec = record_with_tokens(&[]);
        assert!(rec.supports_token(BASE_TOKEN));
        assert!(!rec.supports_token("TRI"));
    }

    #[test]
    fn declared_tokens_are_matched_exactly() {
        let rec = record_with_tokens(&["TRI"]);
        assert!(rec.supports_token("TRI"));
        assert!(!rec.supports_token(BASE_TOKEN));
    }

    #[test]
    fn register_request_rejects_negative_balance() {
        let req = RegisterRequest {
            did: "d".into(),
            peer_id: "p".into(),
            balance: -1.0,
            node_type: 0,
            supported_tokens: vec![],
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn register_request_rejects_unknown_node_type() {
        let req = RegisterRequest {
            did: "d".into(),
            peer_id: "p".into(),
            balance: 1.0,
            node_type: 5,
            supported_tokens: vec![],
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn assignment_address_joins_peer_and_did() {
        let rec = record_with_tokens(&[]);
        let assignment = QuorumAssignment::new(&rec);
        assert_eq!(assignment.type_tag, PRIVATE_SUBNET_TYPE);
        assert_eq!(assignment.address, "p.d");
    }
}
