//! Liveness and staleness predicates
//!
//! Two independent thresholds: a node silent for more than the liveness
//! window is excluded from selection; one silent past the stale threshold
//! is demoted by the sweeper. The gap between the two avoids flapping
//! availability on transient delay.

use chrono::{DateTime, Utc};

use crate::registry::model::QuorumRecord;

/// A node must have pinged within this window to be eligible for selection.
pub const LIVENESS_WINDOW_SECS: i64 = 5 * 60;

/// A node silent longer than this is marked unavailable by the sweeper.
pub const STALE_THRESHOLD_SECS: i64 = 10 * 60;

/// A record is live iff it asserts availability and pinged recently.
pub fn is_live(record: &QuorumRecord, now: DateTime<Utc>) -> bool {
    record.available && (now - record.last_ping).num_seconds() < LIVENESS_WINDOW_SECS
}

/// A record is stale iff its last ping is past the stale threshold.
/// Independent of `available`; strictly looser than liveness.
pub fn is_stale(last_ping: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    (now - last_ping).num_seconds() > STALE_THRESHOLD_SECS
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(available: bool, silent_secs: i64, now: DateTime<Utc>) -> QuorumRecord {
        QuorumRecord {
            did: "d".into(),
            peer_id: "p".into(),
            balance: 0.0,
            node_type: 0,
            available,
            last_ping: now - Duration::seconds(silent_secs),
            assignment_count: 0,
            last_assignment: None,
            registration_time: now,
            supported_tokens: vec![],
        }
    }

    #[test]
    fn fresh_ping_is_live() {
        let now = Utc::now();
        assert!(is_live(&record(true, 10, now), now));
    }

    #[test]
    fn unavailable_record_is_never_live() {
        let now = Utc::now();
        assert!(!is_live(&record(false, 10, now), now));
    }

    #[test]
    fn dead_zone_is_not_live_but_not_stale() {
        // 5-10 minutes silent: excluded from selection, not yet demoted.
        let now = Utc::now();
        let rec = record(true, 7 * 60, now);
        assert!(!is_live(&rec, now));
        assert!(!is_stale(rec.last_ping, now));
    }

    #[test]
    fn silence_past_threshold_is_stale() {
        let now = Utc::now();
        let rec = record(true, 11 * 60, now);
        assert!(is_stale(rec.last_ping, now));
    }
}
