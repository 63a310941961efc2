//! Event delivery.
//!
//! One sweep lists every PENDING/FAILED record and attempts an HTTP
//! POST per record with a bounded timeout. HTTP 200 marks the record
//! SENT; anything else (including transport errors) marks it FAILED,
//! which keeps it eligible for the next sweep. Retries are unbounded;
//! the collector side is expected to be idempotent.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::ConfigError;
use crate::store::{EventStore, LogRecord, StoreError};

/// Wire format for one delivered event.
#[derive(Serialize)]
struct EventPayload<'a> {
    timestamp: String,
    query_text: Option<&'a str>,
    explain_text: Option<&'a str>,
    duration_ms: Option<f64>,
    pattern_name: Option<&'a str>,
}

impl<'a> EventPayload<'a> {
    fn from_record(record: &'a LogRecord) -> Self {
        Self {
            timestamp: record.timestamp.format("%Y-%m-%dT%H:%M:%S%.3f").to_string(),
            query_text: record.query_text.as_deref(),
            explain_text: record.explain_text.as_deref(),
            duration_ms: record.duration_ms,
            pattern_name: record.pattern_name.as_deref(),
        }
    }
}

/// Outcome of one dispatcher sweep.
#[derive(Debug, Default, Clone, Copy)]
pub struct SweepStats {
    pub attempted: usize,
    pub sent: usize,
    pub failed: usize,
}

/// Forwards persisted records to the remote collector.
pub struct EventDispatcher {
    endpoint: String,
    client: reqwest::blocking::Client,
}

impl EventDispatcher {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ConfigError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::Init(format!("event HTTP client: {}", e)))?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }

    /// One pass over all currently pending/failed events. Store errors
    /// propagate; delivery failures become FAILED statuses.
    pub fn sweep(&self, store: &EventStore) -> Result<SweepStats, StoreError> {
        let events = store.list_pending()?;
        let mut stats = SweepStats {
            attempted: events.len(),
            ..SweepStats::default()
        };

        for event in &events {
            // Unpersisted records never reach a sweep.
            let Some(id) = event.id else { continue };
            if self.send(event) {
                store.mark_sent(id)?;
                stats.sent += 1;
                debug!(event_id = id, "event delivered");
            } else {
                store.mark_failed(id)?;
                stats.failed += 1;
            }
        }
        Ok(stats)
    }

    /// Attempt one delivery. Success is exactly HTTP 200.
    fn send(&self, event: &LogRecord) -> bool {
        let payload = EventPayload::from_record(event);
        match self.client.post(&self.endpoint).json(&payload).send() {
            Ok(response) => {
                let ok = response.status() == StatusCode::OK;
                if !ok {
                    warn!(
                        event_id = event.id,
                        status = response.status().as_u16(),
                        "collector rejected event"
                    );
                }
                ok
            }
            Err(e) => {
                warn!(event_id = event.id, error = %e, "event delivery failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EventStatus;
    use chrono::NaiveDate;

    fn record() -> LogRecord {
        LogRecord {
            id: None,
            timestamp: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_milli_opt(10, 0, 0, 123)
                .unwrap(),
            query_text: Some("SELECT * FROM t".to_string()),
            explain_text: None,
            duration_ms: Some(12.5),
            pattern_name: Some("select_statement".to_string()),
            status: EventStatus::Pending,
        }
    }

    #[test]
    fn payload_serializes_iso8601_with_milliseconds() {
        let record = record();
        let json = serde_json::to_value(EventPayload::from_record(&record)).unwrap();
        assert_eq!(json["timestamp"], "2024-01-01T10:00:00.123");
        assert_eq!(json["query_text"], "SELECT * FROM t");
        assert_eq!(json["explain_text"], serde_json::Value::Null);
        assert_eq!(json["duration_ms"], 12.5);
        assert_eq!(json["pattern_name"], "select_statement");
    }

    #[test]
    fn unreachable_collector_marks_records_failed_and_keeps_them() {
        let dir = tempfile::tempdir().unwrap();
        let store = EventStore::open(&dir.path().join("events.db")).unwrap();
        store.save(&record()).unwrap();

        // Reserved port: connection refused, no network involved.
        let dispatcher = EventDispatcher::new(
            "http://127.0.0.1:1/api/events",
            Duration::from_millis(200),
        )
        .unwrap();

        let stats = dispatcher.sweep(&store).unwrap();
        assert_eq!(stats.attempted, 1);
        assert_eq!(stats.sent, 0);
        assert_eq!(stats.failed, 1);

        // Still eligible for the next sweep.
        let pending = store.list_pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].status, EventStatus::Failed);
    }

    #[test]
    fn empty_store_sweeps_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let store = EventStore::open(&dir.path().join("events.db")).unwrap();
        let dispatcher =
            EventDispatcher::new("http://127.0.0.1:1/", Duration::from_millis(200)).unwrap();
        let stats = dispatcher.sweep(&store).unwrap();
        assert_eq!(stats.attempted, 0);
    }
}
