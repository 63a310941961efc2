//! Durable event queue.
//!
//! Reconstructed query records are persisted to a local SQLite table
//! with a delivery-status lifecycle: saved as PENDING, flipped to SENT
//! or FAILED by the dispatcher. FAILED records stay eligible for the
//! next sweep.

pub mod query_cache;

use std::path::Path;

use chrono::NaiveDateTime;
use rusqlite::{Connection, params};

/// Timestamp text format used in the store (millisecond precision).
const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS log_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    query_text TEXT,
    explain_text TEXT,
    duration_ms REAL,
    pattern_name TEXT,
    status TEXT NOT NULL DEFAULT 'PENDING',
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_log_events_status ON log_events(status);
CREATE INDEX IF NOT EXISTS idx_log_events_timestamp ON log_events(timestamp);
CREATE INDEX IF NOT EXISTS idx_log_events_pattern ON log_events(pattern_name);
"#;

/// Delivery lifecycle of a persisted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    Pending,
    Sent,
    Failed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Pending => "PENDING",
            EventStatus::Sent => "SENT",
            EventStatus::Failed => "FAILED",
        }
    }

    fn from_str(s: &str) -> EventStatus {
        match s {
            "SENT" => EventStatus::Sent,
            "FAILED" => EventStatus::Failed,
            _ => EventStatus::Pending,
        }
    }
}

/// A reconstructed query event. Created by the correlator; only the
/// dispatcher mutates it afterwards (status transitions).
#[derive(Debug, Clone)]
pub struct LogRecord {
    /// Surrogate key, populated once persisted.
    pub id: Option<i64>,
    pub timestamp: NaiveDateTime,
    pub query_text: Option<String>,
    pub explain_text: Option<String>,
    pub duration_ms: Option<f64>,
    pub pattern_name: Option<String>,
    pub status: EventStatus,
}

/// Storage error.
#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Sqlite(e) => write!(f, "event store error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Sqlite(e)
    }
}

/// SQLite-backed event queue.
pub struct EventStore {
    conn: Connection,
}

impl EventStore {
    /// Open (creating schema if needed) the event store at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn })
    }

    /// Persist a record as PENDING; insert and initial status are one
    /// statement, so they are atomic. Returns the surrogate id.
    pub fn save(&self, record: &LogRecord) -> Result<i64, StoreError> {
        self.conn.execute(
            "INSERT INTO log_events \
             (timestamp, query_text, explain_text, duration_ms, pattern_name, status) \
             VALUES (?1, ?2, ?3, ?4, ?5, 'PENDING')",
            params![
                record.timestamp.format(TS_FORMAT).to_string(),
                record.query_text,
                record.explain_text,
                record.duration_ms,
                record.pattern_name,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Records eligible for dispatch: PENDING plus FAILED, oldest first.
    /// The sweep re-lists by status, which is what makes retries happen.
    pub fn list_pending(&self) -> Result<Vec<LogRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, timestamp, query_text, explain_text, duration_ms, pattern_name, status \
             FROM log_events WHERE status IN ('PENDING', 'FAILED') ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            let ts: String = row.get(1)?;
            let status: String = row.get(6)?;
            Ok(LogRecord {
                id: Some(row.get(0)?),
                timestamp: NaiveDateTime::parse_from_str(&ts, TS_FORMAT)
                    .unwrap_or_default(),
                query_text: row.get(2)?,
                explain_text: row.get(3)?,
                duration_ms: row.get(4)?,
                pattern_name: row.get(5)?,
                status: EventStatus::from_str(&status),
            })
        })?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Mark a record delivered. Idempotent: re-marking a SENT record is
    /// a no-op, not an error.
    pub fn mark_sent(&self, id: i64) -> Result<(), StoreError> {
        self.set_status(id, EventStatus::Sent)
    }

    /// Mark a delivery attempt failed; the record stays eligible for
    /// the next sweep.
    pub fn mark_failed(&self, id: i64) -> Result<(), StoreError> {
        self.set_status(id, EventStatus::Failed)
    }

    fn set_status(&self, id: i64, status: EventStatus) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE log_events SET status = ?1, updated_at = datetime('now') WHERE id = ?2",
            params![status.as_str(), id],
        )?;
        Ok(())
    }

    /// Number of stored records, any status.
    pub fn count(&self) -> Result<i64, StoreError> {
        let count =
            self.conn
                .query_row("SELECT COUNT(*) FROM log_events", [], |row| row.get(0))?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_record() -> LogRecord {
        LogRecord {
            id: None,
            timestamp: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_milli_opt(10, 0, 0, 0)
                .unwrap(),
            query_text: Some("SELECT * FROM t".to_string()),
            explain_text: Some("plan".to_string()),
            duration_ms: Some(12.5),
            pattern_name: Some("select_statement".to_string()),
            status: EventStatus::Pending,
        }
    }

    fn open_store(dir: &tempfile::TempDir) -> EventStore {
        EventStore::open(&dir.path().join("events.db")).unwrap()
    }

    #[test]
    fn saved_record_is_pending() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        let id = store.save(&sample_record()).unwrap();
        let pending = store.list_pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, Some(id));
        assert_eq!(pending[0].status, EventStatus::Pending);
        assert_eq!(pending[0].query_text.as_deref(), Some("SELECT * FROM t"));
        assert_eq!(pending[0].duration_ms, Some(12.5));
        assert_eq!(pending[0].timestamp, sample_record().timestamp);
    }

    #[test]
    fn sent_records_leave_the_pending_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        let id = store.save(&sample_record()).unwrap();
        store.mark_sent(id).unwrap();
        assert!(store.list_pending().unwrap().is_empty());
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn mark_sent_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        let id = store.save(&sample_record()).unwrap();
        store.mark_sent(id).unwrap();
        store.mark_sent(id).unwrap();
        assert!(store.list_pending().unwrap().is_empty());
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn failed_records_stay_eligible_for_retry() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        let id = store.save(&sample_record()).unwrap();
        store.mark_failed(id).unwrap();

        let pending = store.list_pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].status, EventStatus::Failed);
    }

    #[test]
    fn list_pending_is_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        let first = store.save(&sample_record()).unwrap();
        let second = store.save(&sample_record()).unwrap();
        let ids: Vec<_> = store
            .list_pending()
            .unwrap()
            .into_iter()
            .map(|r| r.id.unwrap())
            .collect();
        assert_eq!(ids, vec![first, second]);
    }

    #[test]
    fn nullable_fields_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        let record = LogRecord {
            query_text: None,
            explain_text: None,
            duration_ms: None,
            pattern_name: None,
            ..sample_record()
        };
        store.save(&record).unwrap();
        let pending = store.list_pending().unwrap();
        assert_eq!(pending[0].query_text, None);
        assert_eq!(pending[0].duration_ms, None);
        assert_eq!(pending[0].pattern_name, None);
    }
}
