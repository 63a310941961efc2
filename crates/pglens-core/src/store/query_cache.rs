//! Query shape de-duplication cache.
//!
//! Keeps a sha256 hash of each normalized query shape so identical
//! shapes can be recognized across restarts. This is an aid for
//! avoiding re-submission, not a delivery guarantee; the event queue
//! stays at-least-once.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};
use sha2::{Digest, Sha256};

use super::StoreError;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS query_cache (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    query_hash TEXT NOT NULL UNIQUE,
    query_text TEXT NOT NULL,
    query_type TEXT NOT NULL,
    sent_to_server INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_query_cache_hash ON query_cache(query_hash);
"#;

/// Statement kind, determined by lightweight tokenisation of the
/// leading keyword. No SQL semantic analysis beyond this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Select,
    Update,
    Delete,
    Merge,
    Other,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Select => "SELECT",
            QueryType::Update => "UPDATE",
            QueryType::Delete => "DELETE",
            QueryType::Merge => "MERGE",
            QueryType::Other => "OTHER",
        }
    }

    /// Classify by the first keyword token. A leading `WITH` (CTE)
    /// resolves to the first DML keyword that follows.
    pub fn detect(query_text: &str) -> QueryType {
        for token in query_text.split_whitespace() {
            match token.to_ascii_uppercase().as_str() {
                "SELECT" => return QueryType::Select,
                "UPDATE" => return QueryType::Update,
                "DELETE" => return QueryType::Delete,
                "MERGE" => return QueryType::Merge,
                _ => continue,
            }
        }
        QueryType::Other
    }
}

/// Hash of the normalized query shape: whitespace collapsed to single
/// spaces, uppercased, sha256 hex.
pub fn query_hash(query_text: &str) -> String {
    let normalized = query_text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase();
    let digest = Sha256::digest(normalized.as_bytes());
    let mut hex = String::with_capacity(64);
    for byte in digest {
        hex.push_str(&format!("{:02x}", byte));
    }
    hex
}

/// SQLite-backed cache of seen query shapes, unique on `query_hash`.
pub struct QueryCache {
    conn: Connection,
}

impl QueryCache {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn })
    }

    /// Record a query shape. Returns `true` when the shape is new,
    /// `false` when it was already known (the entry's `updated_at` is
    /// refreshed either way).
    pub fn observe(&self, query_text: &str) -> Result<bool, StoreError> {
        let hash = query_hash(query_text);
        let query_type = QueryType::detect(query_text);

        let known: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM query_cache WHERE query_hash = ?1",
                params![hash],
                |row| row.get(0),
            )
            .optional()?;
        if known.is_some() {
            self.conn.execute(
                "UPDATE query_cache SET updated_at = datetime('now') WHERE query_hash = ?1",
                params![hash],
            )?;
            return Ok(false);
        }
        self.conn.execute(
            "INSERT INTO query_cache (query_hash, query_text, query_type) VALUES (?1, ?2, ?3)",
            params![hash, query_text, query_type.as_str()],
        )?;
        Ok(true)
    }

    /// Whether this query shape has already been forwarded.
    pub fn sent_to_server(&self, query_text: &str) -> Result<bool, StoreError> {
        let sent: Option<i64> = self
            .conn
            .query_row(
                "SELECT sent_to_server FROM query_cache WHERE query_hash = ?1",
                params![query_hash(query_text)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(sent == Some(1))
    }

    /// Flag a shape as forwarded.
    pub fn mark_sent_to_server(&self, query_text: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE query_cache SET sent_to_server = 1, updated_at = datetime('now') \
             WHERE query_hash = ?1",
            params![query_hash(query_text)],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_cache(dir: &tempfile::TempDir) -> QueryCache {
        QueryCache::open(&dir.path().join("cache.db")).unwrap()
    }

    #[test]
    fn first_observation_is_new_second_is_not() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir);

        assert!(cache.observe("SELECT * FROM t").unwrap());
        assert!(!cache.observe("SELECT * FROM t").unwrap());
    }

    #[test]
    fn normalization_collapses_whitespace_and_case() {
        assert_eq!(
            query_hash("select  *\n from   t"),
            query_hash("SELECT * FROM T")
        );
        assert_ne!(query_hash("SELECT * FROM t"), query_hash("SELECT * FROM u"));
    }

    #[test]
    fn equivalent_shapes_share_one_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir);

        assert!(cache.observe("SELECT *  FROM t").unwrap());
        assert!(!cache.observe("select * from T").unwrap());
    }

    #[test]
    fn query_type_detection() {
        assert_eq!(QueryType::detect("SELECT 1"), QueryType::Select);
        assert_eq!(QueryType::detect("update t set x = 1"), QueryType::Update);
        assert_eq!(QueryType::detect("DELETE FROM t"), QueryType::Delete);
        assert_eq!(QueryType::detect("MERGE INTO t USING u"), QueryType::Merge);
        assert_eq!(
            QueryType::detect("WITH cte AS (SELECT 1) SELECT * FROM cte"),
            QueryType::Select
        );
        assert_eq!(QueryType::detect("VACUUM t"), QueryType::Other);
    }

    #[test]
    fn sent_to_server_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir);

        cache.observe("SELECT * FROM t").unwrap();
        assert!(!cache.sent_to_server("SELECT * FROM t").unwrap());
        cache.mark_sent_to_server("SELECT * FROM t").unwrap();
        assert!(cache.sent_to_server("SELECT * FROM t").unwrap());
    }
}
