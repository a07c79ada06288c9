//! SQLite schema for the durable registry backend

use rusqlite::Connection;
use tracing::info;

use crate::error::Result;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new registry schema v{}", SCHEMA_VERSION);
        conn.execute_batch(REGISTRY_SCHEMA)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!(
            "Migrating registry schema from v{} to v{}",
            current_version, SCHEMA_VERSION
        );
        set_schema_version(conn, SCHEMA_VERSION)?;
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &Connection) -> Result<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )?;

    let version: i32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .unwrap_or(0);

    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])?;
    Ok(())
}

/// Registry tables. Timestamps are epoch milliseconds; token sets and
/// audit DID lists are JSON text.
const REGISTRY_SCHEMA: &str = r#"
-- One row per registered quorum node
CREATE TABLE IF NOT EXISTS quorums (
    did TEXT PRIMARY KEY NOT NULL,
    peer_id TEXT NOT NULL,
    balance REAL NOT NULL DEFAULT 0,
    node_type INTEGER NOT NULL,
    available INTEGER NOT NULL DEFAULT 1,
    last_ping INTEGER NOT NULL,
    assignment_count INTEGER NOT NULL DEFAULT 0,
    last_assignment INTEGER,
    registration_time INTEGER NOT NULL,
    supported_tokens TEXT NOT NULL DEFAULT '[]'
);

CREATE INDEX IF NOT EXISTS idx_quorums_peer_id ON quorums(peer_id);
CREATE INDEX IF NOT EXISTS idx_quorums_available ON quorums(available);
CREATE INDEX IF NOT EXISTS idx_quorums_last_ping ON quorums(last_ping);

-- Append-only audit of successful selections
CREATE TABLE IF NOT EXISTS transaction_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    transaction_id TEXT NOT NULL,
    transaction_amount REAL NOT NULL,
    quorum_dids TEXT NOT NULL,
    required_balance REAL NOT NULL,
    timestamp INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_txn_history_timestamp ON transaction_history(timestamp);

-- Append-only record of balance changes
CREATE TABLE IF NOT EXISTS balance_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    quorum_did TEXT NOT NULL,
    old_balance REAL NOT NULL,
    new_balance REAL NOT NULL,
    change_reason TEXT NOT NULL,
    timestamp INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_balance_history_did ON balance_history(quorum_did);
"#;
