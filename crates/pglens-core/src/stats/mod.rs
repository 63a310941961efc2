//! Periodic statistics collection from PostgreSQL cumulative views.
//!
//! Each view is described by a small manifest (`StatView`): the view
//! name, the column set to project, and the query. A collection cycle
//! runs every manifest against a single shared connection and produces
//! one `StatSnapshot`. Per-view failures are logged and skipped so one
//! broken view never poisons a cycle; connection failures abort the
//! cycle and force a reconnect on the next one.

mod database;
mod functions;
mod indexes;
mod replication;
mod tables;
mod wal;

pub mod runner;

pub use database::DatabaseStats;
pub use functions::FunctionStats;
pub use indexes::IndexStats;
pub use replication::ReplicationStats;
pub use tables::TableStats;
pub use wal::WalStats;

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use postgres::{Client, NoTls};
use serde_json::Value;
use tracing::{debug, warn};

/// One result row: column name to JSON value, in projection order is
/// not preserved (map keyed by column), which is fine for metrics.
pub type Row = serde_json::Map<String, Value>;

/// One projected column of a statistics view.
pub struct ColumnSpec {
    pub name: &'static str,
    pub description: &'static str,
}

/// Manifest for one pg_stat view.
pub trait StatView: Send {
    /// View name, e.g. `pg_stat_database`.
    fn view(&self) -> &'static str;

    fn columns(&self) -> &'static [ColumnSpec];

    /// The SELECT to run. Every column is cast to text so rows can be
    /// read uniformly regardless of the server-side column type.
    fn query(&self) -> String {
        format!("SELECT {} FROM {}", projection(self.columns()), self.view())
    }
}

pub(crate) fn projection(columns: &[ColumnSpec]) -> String {
    columns
        .iter()
        .map(|c| format!("{n}::text AS {n}", n = c.name))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug)]
pub enum StatsError {
    Connection(String),
    Query { view: String, message: String },
}

impl std::fmt::Display for StatsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatsError::Connection(msg) => write!(f, "PostgreSQL connection error: {}", msg),
            StatsError::Query { view, message } => {
                write!(f, "query against {} failed: {}", view, message)
            }
        }
    }
}

impl std::error::Error for StatsError {}

/// One collection cycle's worth of view data.
pub struct StatSnapshot {
    pub collected_at: NaiveDateTime,
    pub views: BTreeMap<String, Vec<Row>>,
}

/// Collects statistics snapshots over a single reused connection.
///
/// Connects to PostgreSQL using standard environment variables:
/// - PGHOST (default: localhost)
/// - PGPORT (default: 5432)
/// - PGUSER (default: $USER)
/// - PGPASSWORD (default: empty)
/// - PGDATABASE (default: same as PGUSER)
pub struct StatsCollector {
    connection_string: String,
    client: Option<Client>,
    views: Vec<Box<dyn StatView>>,
}

/// The full default manifest set.
pub fn default_views() -> Vec<Box<dyn StatView>> {
    vec![
        Box::new(DatabaseStats),
        Box::new(TableStats),
        Box::new(IndexStats),
        Box::new(FunctionStats),
        Box::new(ReplicationStats),
        Box::new(WalStats),
    ]
}

impl StatsCollector {
    /// Creates a collector from environment variables.
    ///
    /// Uses $USER as default if PGUSER is not set.
    pub fn from_env() -> Result<Self, StatsError> {
        let user = std::env::var("PGUSER")
            .or_else(|_| std::env::var("USER"))
            .map_err(|_| StatsError::Connection("PGUSER or USER not set".to_string()))?;

        let host = std::env::var("PGHOST").unwrap_or_else(|_| "localhost".to_string());
        let port = std::env::var("PGPORT").unwrap_or_else(|_| "5432".to_string());
        let password = std::env::var("PGPASSWORD").unwrap_or_default();
        let database = std::env::var("PGDATABASE").unwrap_or_else(|_| user.clone());

        let connection_string = if password.is_empty() {
            format!(
                "host={} port={} user={} dbname={}",
                host, port, user, database
            )
        } else {
            format!(
                "host={} port={} user={} password={} dbname={}",
                host, port, user, password, database
            )
        };

        Ok(Self::with_connection_string(connection_string))
    }

    /// Creates a collector with an explicit connection string.
    pub fn with_connection_string(connection_string: String) -> Self {
        Self {
            connection_string,
            client: None,
            views: default_views(),
        }
    }

    fn ensure_connected(&mut self) -> Result<(), StatsError> {
        if self.client.is_none() {
            let client = Client::connect(&self.connection_string, NoTls)
                .map_err(|e| StatsError::Connection(e.to_string()))?;
            debug!("connected to PostgreSQL for statistics collection");
            self.client = Some(client);
        }
        Ok(())
    }

    /// Runs one collection cycle. Connection failures are fatal for
    /// the cycle; per-view query failures are skipped.
    pub fn collect(&mut self) -> Result<StatSnapshot, StatsError> {
        self.ensure_connected()?;
        let client = self.client.as_mut().ok_or_else(|| {
            StatsError::Connection("no client after connect".to_string())
        })?;
        let snapshot = collect_from(&self.views, |view| fetch_view(client, view));

        // A closed connection means every subsequent query would fail
        // too; drop it so the next cycle reconnects.
        if self.client.as_ref().is_some_and(|c| c.is_closed()) {
            self.client = None;
            return Err(StatsError::Connection(
                "connection closed during collection".to_string(),
            ));
        }
        Ok(snapshot)
    }
}

/// Runs every manifest through `fetch`, skipping views that fail.
/// Split out from `collect` so failure isolation is testable without
/// a live server.
fn collect_from<F>(views: &[Box<dyn StatView>], mut fetch: F) -> StatSnapshot
where
    F: FnMut(&dyn StatView) -> Result<Vec<Row>, StatsError>,
{
    let mut snapshot = StatSnapshot {
        collected_at: chrono::Utc::now().naive_utc(),
        views: BTreeMap::new(),
    };
    for view in views {
        match fetch(view.as_ref()) {
            Ok(rows) => {
                snapshot.views.insert(view.view().to_string(), rows);
            }
            Err(e) => {
                warn!(view = view.view(), error = %e, "skipping statistics view");
            }
        }
    }
    snapshot
}

fn fetch_view(client: &mut Client, view: &dyn StatView) -> Result<Vec<Row>, StatsError> {
    let rows = client
        .query(&view.query(), &[])
        .map_err(|e| StatsError::Query {
            view: view.view().to_string(),
            message: e.to_string(),
        })?;

    let columns = view.columns();
    let mut out = Vec::with_capacity(rows.len());
    for row in &rows {
        let mut map = Row::new();
        for (idx, column) in columns.iter().enumerate() {
            let text: Option<String> = row.try_get(idx).map_err(|e| StatsError::Query {
                view: view.view().to_string(),
                message: e.to_string(),
            })?;
            map.insert(column.name.to_string(), coerce(text));
        }
        out.push(map);
    }
    Ok(out)
}

/// Text-cast column values become numbers when they parse as finite
/// floats, otherwise strings; SQL NULL stays null.
fn coerce(text: Option<String>) -> Value {
    match text {
        None => Value::Null,
        Some(s) => match s.parse::<f64>() {
            Ok(n) if n.is_finite() => serde_json::Number::from_f64(n)
                .map(Value::Number)
                .unwrap_or(Value::String(s)),
            _ => Value::String(s),
        },
    }
}
