//! Durable local sink.

use std::path::PathBuf;

use chrono::NaiveDateTime;
use rusqlite::{Connection, params};
use serde_json::Value;

use super::{Metric, MetricSink, SinkError};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS metrics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    metric_name TEXT NOT NULL,
    metric_value REAL,
    metric_labels TEXT
);

CREATE INDEX IF NOT EXISTS idx_metrics_timestamp ON metrics(timestamp);
CREATE INDEX IF NOT EXISTS idx_metrics_name ON metrics(metric_name);
"#;

/// Appends metrics to a local SQLite store, one row per metric.
/// The connection and schema are created lazily on first write; a
/// missing path is caught earlier, at sink construction time.
pub struct SqliteSink {
    path: PathBuf,
    conn: Option<Connection>,
}

impl SqliteSink {
    pub fn new(path: PathBuf) -> Self {
        Self { path, conn: None }
    }

    fn ensure_conn(&mut self) -> Result<&Connection, SinkError> {
        if self.conn.is_none() {
            let conn = Connection::open(&self.path)?;
            conn.execute_batch(SCHEMA_SQL)?;
            self.conn = Some(conn);
        }
        Ok(self.conn.as_ref().expect("connection opened above"))
    }
}

impl MetricSink for SqliteSink {
    fn write(
        &mut self,
        metrics: &[Metric],
        collected_at: NaiveDateTime,
    ) -> Result<(), SinkError> {
        let timestamp = collected_at.format("%Y-%m-%dT%H:%M:%S%.3f").to_string();
        let conn = self.ensure_conn()?;

        let mut stmt = conn.prepare_cached(
            "INSERT INTO metrics (timestamp, metric_name, metric_value, metric_labels) \
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for metric in metrics {
            let value = match &metric.value {
                Value::Number(n) => n.as_f64(),
                _ => None,
            };
            let labels = serde_json::to_string(&metric.labels).unwrap_or_default();
            stmt.execute(params![timestamp, metric.name, value, labels])?;
        }
        Ok(())
    }

    fn close(&mut self) {
        self.conn = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn metric(name: &str, value: Value) -> Metric {
        let mut labels = serde_json::Map::new();
        labels.insert("datname".to_string(), json!("app"));
        Metric {
            name: name.to_string(),
            value,
            labels,
        }
    }

    #[test]
    fn schema_is_created_lazily_and_rows_are_appended() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.db");
        let mut sink = SqliteSink::new(path.clone());

        // No file until the first write.
        assert!(!path.exists());

        let ts = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        sink.write(
            &[
                metric("pg_stat_database.xact_commit", json!(120.0)),
                metric("pg_stat_replication", Value::Null),
            ],
            ts,
        )
        .unwrap();
        sink.close();

        let conn = Connection::open(&path).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM metrics", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);

        let (name, value, labels): (String, Option<f64>, String) = conn
            .query_row(
                "SELECT metric_name, metric_value, metric_labels FROM metrics \
                 WHERE metric_name = 'pg_stat_database.xact_commit'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(name, "pg_stat_database.xact_commit");
        assert_eq!(value, Some(120.0));
        assert!(labels.contains("datname"));
    }

    #[test]
    fn write_after_close_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.db");
        let mut sink = SqliteSink::new(path.clone());
        let ts = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();

        sink.write(&[metric("a", json!(1.0))], ts).unwrap();
        sink.close();
        sink.write(&[metric("b", json!(2.0))], ts).unwrap();
        sink.close();

        let conn = Connection::open(&path).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM metrics", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }
}
