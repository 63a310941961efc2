//! Pluggable metric outputs.
//!
//! All sinks consume the same envelope: a collection timestamp plus a
//! flat list of metrics derived from the statistics views. The variant
//! is chosen once at startup by `create_sink`, which validates the
//! variant-specific configuration eagerly.

mod debug;
mod http;
mod sqlite;

pub use debug::DebugSink;
pub use http::HttpSink;
pub use sqlite::SqliteSink;

use std::time::Duration;

use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::Value;

use crate::config::{ConfigError, SinkSettings};
use crate::stats::StatSnapshot;

/// One flattened metric: numeric view columns become values, the
/// remaining columns of the same row become labels.
#[derive(Debug, Clone, Serialize)]
pub struct Metric {
    pub name: String,
    pub value: Value,
    pub labels: serde_json::Map<String, Value>,
}

/// Sink failure; the caller decides the retry policy.
#[derive(Debug)]
pub enum SinkError {
    Http(reqwest::Error),
    /// The endpoint answered outside the 2xx range.
    HttpStatus(u16),
    Sqlite(rusqlite::Error),
    Io(std::io::Error),
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::Http(e) => write!(f, "metric delivery failed: {}", e),
            SinkError::HttpStatus(code) => write!(f, "metric endpoint returned HTTP {}", code),
            SinkError::Sqlite(e) => write!(f, "metric store error: {}", e),
            SinkError::Io(e) => write!(f, "metric sink I/O error: {}", e),
        }
    }
}

impl std::error::Error for SinkError {}

impl From<reqwest::Error> for SinkError {
    fn from(e: reqwest::Error) -> Self {
        SinkError::Http(e)
    }
}

impl From<rusqlite::Error> for SinkError {
    fn from(e: rusqlite::Error) -> Self {
        SinkError::Sqlite(e)
    }
}

impl From<std::io::Error> for SinkError {
    fn from(e: std::io::Error) -> Self {
        SinkError::Io(e)
    }
}

/// Output destination for collected statistics.
pub trait MetricSink: Send {
    fn write(&mut self, metrics: &[Metric], collected_at: NaiveDateTime)
    -> Result<(), SinkError>;

    /// Flush and release resources. Default: nothing to do.
    fn close(&mut self) {}
}

/// Construct the configured sink variant, failing fast on missing
/// variant-specific parameters.
pub fn create_sink(
    settings: &SinkSettings,
    http_timeout: Duration,
) -> Result<Box<dyn MetricSink>, ConfigError> {
    match settings.kind.as_str() {
        "debug" => Ok(Box::new(DebugSink::new(settings.pretty))),
        "http" => {
            let endpoint = settings
                .endpoint
                .clone()
                .ok_or(ConfigError::MissingSinkParameter {
                    sink: "http",
                    parameter: "endpoint",
                })?;
            Ok(Box::new(HttpSink::new(
                endpoint,
                settings.api_key.clone(),
                http_timeout,
            )?))
        }
        "sqlite" => {
            let path = settings
                .db_path
                .clone()
                .ok_or(ConfigError::MissingSinkParameter {
                    sink: "sqlite",
                    parameter: "db-path",
                })?;
            Ok(Box::new(SqliteSink::new(path)))
        }
        other => Err(ConfigError::UnknownSinkType(other.to_string())),
    }
}

/// Flatten a statistics snapshot into sink metrics. Each numeric
/// column of each row becomes `<view>.<column>`; the row's non-numeric
/// columns become its labels. A row with no numeric columns is carried
/// whole as a single labelled metric named after the view.
pub fn flatten_snapshot(snapshot: &StatSnapshot) -> Vec<Metric> {
    let mut metrics = Vec::new();
    for (view, rows) in &snapshot.views {
        for row in rows {
            let mut labels = serde_json::Map::new();
            let mut values: Vec<(String, Value)> = Vec::new();
            for (column, value) in row {
                if value.is_number() {
                    values.push((format!("{}.{}", view, column), value.clone()));
                } else if !value.is_null() {
                    labels.insert(column.clone(), value.clone());
                }
            }
            if values.is_empty() {
                metrics.push(Metric {
                    name: view.clone(),
                    value: Value::Null,
                    labels,
                });
            } else {
                for (name, value) in values {
                    metrics.push(Metric {
                        name,
                        value,
                        labels: labels.clone(),
                    });
                }
            }
        }
    }
    metrics
}

/// The JSON envelope shared by the debug and HTTP sinks.
#[derive(Serialize)]
pub(crate) struct Envelope<'a> {
    pub timestamp: String,
    pub metrics: &'a [Metric],
}

impl<'a> Envelope<'a> {
    pub(crate) fn new(metrics: &'a [Metric], collected_at: NaiveDateTime) -> Self {
        Self {
            timestamp: collected_at.format("%Y-%m-%dT%H:%M:%S%.3f").to_string(),
            metrics,
        }
    }
}
