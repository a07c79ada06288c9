//! Durable SQLite registry backend
//!
//! Same operation contract as the volatile backend, backed by relational
//! tables mirroring the quorum records plus append-only assignment-audit
//! and balance-history logs. The connection sits behind a mutex and every
//! multi-statement operation runs inside a single transaction, so a
//! selection's filter-read, per-row updates, and audit insert commit
//! atomically and concurrent selections cannot double-assign a record.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{RegistryError, Result};
use crate::registry::liveness::{LIVENESS_WINDOW_SECS, STALE_THRESHOLD_SECS};
use crate::registry::model::{
    format_uptime, AssignmentAudit, HealthSummary, QuorumAssignment, QuorumRecord, RegisterRequest,
};
use crate::registry::schema;
use crate::registry::selection::{self, SelectionRequest};
use crate::registry::QuorumStore;

const QUORUM_COLUMNS: &str = "did, peer_id, balance, node_type, available, last_ping, \
     assignment_count, last_assignment, registration_time, supported_tokens";

pub struct SqliteRegistry {
    conn: Mutex<Connection>,
    start_time: DateTime<Utc>,
}

impl SqliteRegistry {
    /// Open or create the registry database at the given path.
    pub fn open(db_path: &Path) -> Result<Self> {
        info!("Opening registry database at {:?}", db_path);
        let conn = Connection::open(db_path)?;

        // WAL mode for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        schema::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            start_time: Utc::now(),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        debug!("Opening in-memory registry database");
        let conn = Connection::open_in_memory()?;
        schema::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            start_time: Utc::now(),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|_| RegistryError::Storage("connection lock poisoned".into()))?;
        f(&conn)
    }

    fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| RegistryError::Storage("connection lock poisoned".into()))?;
        f(&mut conn)
    }
}

fn millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

fn record_from_row(row: &Row) -> rusqlite::Result<QuorumRecord> {
    let tokens_json: String = row.get("supported_tokens")?;
    let last_assignment: Option<i64> = row.get("last_assignment")?;
    Ok(QuorumRecord {
        did: row.get("did")?,
        peer_id: row.get("peer_id")?,
        balance: row.get("balance")?,
        node_type: row.get::<_, i64>("node_type")? as u8,
        available: row.get("available")?,
        last_ping: from_millis(row.get("last_ping")?),
        assignment_count: row.get::<_, i64>("assignment_count")? as u64,
        last_assignment: last_assignment.map(from_millis),
        registration_time: from_millis(row.get("registration_time")?),
        supported_tokens: serde_json::from_str(&tokens_json).unwrap_or_default(),
    })
}

fn record_balance_change(
    conn: &Connection,
    did: &str,
    old_balance: f64,
    new_balance: f64,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO balance_history (quorum_did, old_balance, new_balance, change_reason, timestamp) \
         VALUES (?, ?, ?, ?, ?)",
        params![did, old_balance, new_balance, reason, millis(now)],
    )?;
    Ok(())
}

impl QuorumStore for SqliteRegistry {
    fn register(&self, req: &RegisterRequest) -> Result<()> {
        req.validate()?;
        let now = Utc::now();
        let tokens_json = serde_json::to_string(&req.supported_tokens)
            .map_err(|e| RegistryError::Storage(e.to_string()))?;

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let existing: Option<f64> = tx
                .query_row(
                    "SELECT balance FROM quorums WHERE did = ?",
                    params![req.did],
                    |row| row.get(0),
                )
                .optional()?;

            match existing {
                Some(old_balance) => {
                    if old_balance != req.balance {
                        record_balance_change(
                            &tx,
                            &req.did,
                            old_balance,
                            req.balance,
                            "registration update",
                            now,
                        )?;
                    }
                    tx.execute(
                        "UPDATE quorums SET peer_id = ?, balance = ?, node_type = ?, \
                         available = 1, last_ping = ?, supported_tokens = ? WHERE did = ?",
                        params![
                            req.peer_id,
                            req.balance,
                            req.node_type as i64,
                            millis(now),
                            tokens_json,
                            req.did
                        ],
                    )?;
                    debug!(did = %req.did, "Refreshed existing quorum registration");
                }
                None => {
                    tx.execute(
                        "INSERT INTO quorums (did, peer_id, balance, node_type, available, \
                         last_ping, assignment_count, registration_time, supported_tokens) \
                         VALUES (?, ?, ?, ?, 1, ?, 0, ?, ?)",
                        params![
                            req.did,
                            req.peer_id,
                            req.balance,
                            req.node_type as i64,
                            millis(now),
                            millis(now),
                            tokens_json
                        ],
                    )?;
                    info!(did = %req.did, peer = %req.peer_id, "Registered new quorum");
                }
            }

            tx.commit()?;
            Ok(())
        })
    }

    fn confirm_availability(&self, did: &str) -> Result<()> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE quorums SET available = 1, last_ping = ? WHERE did = ?",
                params![millis(Utc::now()), did],
            )?;
            if updated == 0 {
                return Err(RegistryError::NotFound(did.to_string()));
            }
            Ok(())
        })
    }

    fn heartbeat(&self, did: &str) -> Result<()> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE quorums SET last_ping = ? WHERE did = ?",
                params![millis(Utc::now()), did],
            )?;
            if updated == 0 {
                return Err(RegistryError::NotFound(did.to_string()));
            }
            Ok(())
        })
    }

    fn update_balance(&self, did: &str, new_balance: f64) -> Result<()> {
        if new_balance < 0.0 || !new_balance.is_finite() {
            return Err(RegistryError::InvalidInput(format!(
                "balance must be non-negative, got {new_balance}"
            )));
        }
        let now = Utc::now();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let old_balance: f64 = tx
                .query_row(
                    "SELECT balance FROM quorums WHERE did = ?",
                    params![did],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or_else(|| RegistryError::NotFound(did.to_string()))?;

            if old_balance != new_balance {
                record_balance_change(&tx, did, old_balance, new_balance, "balance update", now)?;
                tx.execute(
                    "UPDATE quorums SET balance = ? WHERE did = ?",
                    params![new_balance, did],
                )?;
            }

            tx.commit()?;
            Ok(())
        })
    }

    fn unregister(&self, did: &str) -> Result<()> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM quorums WHERE did = ?", params![did])?;
            if deleted == 0 {
                return Err(RegistryError::NotFound(did.to_string()));
            }
            info!(did = %did, "Unregistered quorum");
            Ok(())
        })
    }

    fn select(&self, req: &SelectionRequest) -> Result<Vec<QuorumAssignment>> {
        req.validate()?;
        let now = Utc::now();
        let required_balance = req.required_balance();
        let ping_cutoff = millis(now) - LIVENESS_WINDOW_SECS * 1000;

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            // Coarse SQL prefilter; token/partition filtering and ordering
            // run through the shared selection policy so both backends
            // honor an identical contract.
            let candidates: Vec<QuorumRecord> = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {QUORUM_COLUMNS} FROM quorums \
                     WHERE available = 1 AND last_ping > ? AND balance >= ?"
                ))?;
                let rows = stmt.query_map(params![ping_cutoff, required_balance], record_from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            };

            let chosen = selection::choose(candidates.iter(), req, now)?;
            let assignments: Vec<QuorumAssignment> =
                chosen.iter().map(|q| QuorumAssignment::new(q)).collect();
            let dids: Vec<String> = chosen.iter().map(|q| q.did.clone()).collect();

            for did in &dids {
                tx.execute(
                    "UPDATE quorums SET assignment_count = assignment_count + 1, \
                     last_assignment = ? WHERE did = ?",
                    params![millis(now), did],
                )?;
            }

            let dids_json =
                serde_json::to_string(&dids).map_err(|e| RegistryError::Storage(e.to_string()))?;
            tx.execute(
                "INSERT INTO transaction_history \
                 (transaction_id, transaction_amount, quorum_dids, required_balance, timestamp) \
                 VALUES (?, ?, ?, ?, ?)",
                params![
                    format!("txn_{}", Uuid::new_v4().simple()),
                    req.transaction_amount,
                    dids_json,
                    required_balance,
                    millis(now)
                ],
            )?;

            tx.commit()?;
            debug!(count = assignments.len(), "Selected quorums");
            Ok(assignments)
        })
    }

    fn get(&self, did: &str) -> Result<QuorumRecord> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {QUORUM_COLUMNS} FROM quorums WHERE did = ?"),
                params![did],
                record_from_row,
            )
            .optional()?
            .ok_or_else(|| RegistryError::NotFound(did.to_string()))
        })
    }

    fn list(&self) -> Result<Vec<QuorumRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("SELECT {QUORUM_COLUMNS} FROM quorums"))?;
            let rows = stmt.query_map([], record_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    fn health(&self) -> Result<HealthSummary> {
        let now = Utc::now();
        let ping_cutoff = millis(now) - LIVENESS_WINDOW_SECS * 1000;
        self.with_conn(|conn| {
            let total: i64 = conn.query_row("SELECT COUNT(*) FROM quorums", [], |row| row.get(0))?;
            let available: i64 = conn.query_row(
                "SELECT COUNT(*) FROM quorums WHERE available = 1 AND last_ping > ?",
                params![ping_cutoff],
                |row| row.get(0),
            )?;
            Ok(HealthSummary {
                status: "healthy",
                total_quorums: total as usize,
                available_quorums: available as usize,
                uptime: format_uptime(now - self.start_time),
                last_check: now,
            })
        })
    }

    fn transaction_history(&self, limit: usize) -> Result<Vec<AssignmentAudit>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT transaction_id, transaction_amount, quorum_dids, required_balance, timestamp \
                 FROM transaction_history ORDER BY timestamp DESC, id DESC LIMIT ?",
            )?;
            let rows = stmt.query_map(params![limit as i64], |row| {
                let dids_json: String = row.get("quorum_dids")?;
                Ok(AssignmentAudit {
                    transaction_id: row.get("transaction_id")?,
                    transaction_amount: row.get("transaction_amount")?,
                    required_balance: row.get("required_balance")?,
                    quorum_dids: serde_json::from_str(&dids_json).unwrap_or_default(),
                    timestamp: from_millis(row.get("timestamp")?),
                })
            })?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    fn mark_stale(&self) -> Result<usize> {
        let cutoff = millis(Utc::now()) - STALE_THRESHOLD_SECS * 1000;
        self.with_conn(|conn| {
            let demoted = conn.execute(
                "UPDATE quorums SET available = 0 WHERE available = 1 AND last_ping < ?",
                params![cutoff],
            )?;
            Ok(demoted)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(store: &SqliteRegistry, did: &str, balance: f64) {
        store
            .register(&RegisterRequest {
                did: did.to_string(),
                peer_id: format!("peer-{did}"),
                balance,
                node_type: 0,
                supported_tokens: vec![],
            })
            .unwrap();
    }

    fn backdate_ping(store: &SqliteRegistry, did: &str, secs: i64) {
        store
            .with_conn(|conn| {
                conn.execute(
                    "UPDATE quorums SET last_ping = ? WHERE did = ?",
                    params![millis(Utc::now()) - secs * 1000, did],
                )?;
                Ok(())
            })
            .unwrap();
    }

    fn balance_history_count(store: &SqliteRegistry, did: &str) -> i64 {
        store
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM balance_history WHERE quorum_did = ?",
                    params![did],
                    |row| row.get(0),
                )?)
            })
            .unwrap()
    }

    #[test]
    fn register_and_get_roundtrip() {
        let store = SqliteRegistry::open_in_memory().unwrap();
        store
            .register(&RegisterRequest {
                did: "q1".into(),
                peer_id: "peer-1".into(),
                balance: 42.5,
                node_type: 3,
                supported_tokens: vec!["RBT".into(), "TRI".into()],
            })
            .unwrap();

        let rec = store.get("q1").unwrap();
        assert_eq!(rec.peer_id, "peer-1");
        assert_eq!(rec.balance, 42.5);
        assert_eq!(rec.node_type, 3);
        assert!(rec.available);
        assert_eq!(rec.assignment_count, 0);
        assert!(rec.last_assignment.is_none());
        assert_eq!(rec.supported_tokens, vec!["RBT", "TRI"]);
    }

    #[test]
    fn re_registration_updates_fields_and_logs_balance_change() {
        let store = SqliteRegistry::open_in_memory().unwrap();
        register(&store, "q1", 10.0);
        let first = store.get("q1").unwrap();

        store
            .register(&RegisterRequest {
                did: "q1".into(),
                peer_id: "peer-new".into(),
                balance: 20.0,
                node_type: 1,
                supported_tokens: vec![],
            })
            .unwrap();

        let rec = store.get("q1").unwrap();
        assert_eq!(rec.peer_id, "peer-new");
        assert_eq!(rec.balance, 20.0);
        assert_eq!(rec.registration_time, first.registration_time);
        assert_eq!(balance_history_count(&store, "q1"), 1);

        // Same balance: no new history row.
        register(&store, "q1", 20.0);
        assert_eq!(balance_history_count(&store, "q1"), 1);
    }

    #[test]
    fn update_balance_logs_change_and_rejects_negative() {
        let store = SqliteRegistry::open_in_memory().unwrap();
        register(&store, "q1", 10.0);

        store.update_balance("q1", 15.0).unwrap();
        assert_eq!(store.get("q1").unwrap().balance, 15.0);
        assert_eq!(balance_history_count(&store, "q1"), 1);

        // Unchanged value is a no-op.
        store.update_balance("q1", 15.0).unwrap();
        assert_eq!(balance_history_count(&store, "q1"), 1);

        assert!(matches!(
            store.update_balance("q1", -1.0),
            Err(RegistryError::InvalidInput(_))
        ));
        assert!(matches!(
            store.update_balance("missing", 5.0),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn selection_writes_audit_and_bookkeeping_atomically() {
        let store = SqliteRegistry::open_in_memory().unwrap();
        for i in 0..5 {
            register(&store, &format!("q{i}"), 100.0);
        }

        let req = SelectionRequest {
            count: 3,
            transaction_amount: 30.0,
            token: None,
            last_char: None,
        };
        let chosen = store.select(&req).unwrap();
        assert_eq!(chosen.len(), 3);

        let history = store.transaction_history(10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].quorum_dids.len(), 3);
        assert!((history[0].required_balance - 10.0).abs() < f64::EPSILON);

        let assigned = store
            .list()
            .unwrap()
            .into_iter()
            .filter(|q| q.assignment_count == 1)
            .count();
        assert_eq!(assigned, 3);
    }

    #[test]
    fn failed_selection_writes_nothing() {
        let store = SqliteRegistry::open_in_memory().unwrap();
        register(&store, "q1", 5.0);

        let req = SelectionRequest {
            count: 2,
            transaction_amount: 100.0,
            token: None,
            last_char: None,
        };
        let err = store.select(&req).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::InsufficientCandidates {
                found: 0,
                needed: 2,
                ..
            }
        ));

        assert!(store.transaction_history(10).unwrap().is_empty());
        assert_eq!(store.get("q1").unwrap().assignment_count, 0);
    }

    #[test]
    fn transaction_history_is_newest_first_and_limited() {
        let store = SqliteRegistry::open_in_memory().unwrap();
        for i in 0..5 {
            register(&store, &format!("q{i}"), 100.0);
        }
        let req = SelectionRequest {
            count: 2,
            transaction_amount: 20.0,
            token: None,
            last_char: None,
        };
        for _ in 0..3 {
            store.select(&req).unwrap();
        }

        let history = store.transaction_history(2).unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].timestamp >= history[1].timestamp);
    }

    #[test]
    fn sweep_demotes_stale_rows_only_once() {
        let store = SqliteRegistry::open_in_memory().unwrap();
        register(&store, "fresh", 10.0);
        register(&store, "silent", 10.0);
        backdate_ping(&store, "silent", 11 * 60);

        assert_eq!(store.mark_stale().unwrap(), 1);
        assert!(!store.get("silent").unwrap().available);
        assert!(store.get("fresh").unwrap().available);
        assert_eq!(store.mark_stale().unwrap(), 0);

        // Confirmation restores visibility.
        store.confirm_availability("silent").unwrap();
        assert!(store.get("silent").unwrap().available);
    }

    #[test]
    fn unregister_then_get_is_not_found() {
        let store = SqliteRegistry::open_in_memory().unwrap();
        register(&store, "q1", 10.0);
        store.unregister("q1").unwrap();
        assert!(matches!(store.get("q1"), Err(RegistryError::NotFound(_))));
        assert!(matches!(
            store.unregister("q1"),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn heartbeat_does_not_restore_availability() {
        let store = SqliteRegistry::open_in_memory().unwrap();
        register(&store, "q1", 10.0);
        backdate_ping(&store, "q1", 11 * 60);
        store.mark_stale().unwrap();

        store.heartbeat("q1").unwrap();
        let rec = store.get("q1").unwrap();
        assert!(!rec.available);
        assert!((Utc::now() - rec.last_ping).num_seconds() < 5);
    }
}
