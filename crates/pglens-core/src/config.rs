//! Agent configuration.
//!
//! The daemon builds one `AgentConfig` at startup and passes it (or pieces
//! of it) into each component's constructor. There is no ambient global
//! settings object; components only see what they are given.

use std::path::PathBuf;
use std::time::Duration;

/// Which metric sink variant to construct, plus its variant-specific
/// parameters. Validation of required parameters happens in
/// `sink::create_sink`, before any pipeline starts.
#[derive(Debug, Clone)]
pub struct SinkSettings {
    /// Sink variant: "debug", "http" or "sqlite".
    pub kind: String,
    /// HTTP sink endpoint.
    pub endpoint: Option<String>,
    /// Optional bearer token for the HTTP sink.
    pub api_key: Option<String>,
    /// Database file for the sqlite sink.
    pub db_path: Option<PathBuf>,
    /// Pretty-print JSON in the debug sink.
    pub pretty: bool,
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            kind: "debug".to_string(),
            endpoint: None,
            api_key: None,
            db_path: None,
            pretty: true,
        }
    }
}

/// Top-level agent configuration, consumed by the daemon wiring.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Directory containing PostgreSQL log files.
    pub logs_dir: PathBuf,
    /// Shell glob matched against file names in `logs_dir`.
    pub log_pattern: String,
    /// Bulk mode: process every matching file once instead of following
    /// the latest one.
    pub from_beginning: bool,
    /// Interval between dispatcher sweeps while the log is quiet.
    pub poll_interval: Duration,
    /// Sleep between empty reads while tailing.
    pub tail_interval: Duration,
    /// Endpoint receiving reconstructed query events.
    pub event_endpoint: String,
    /// SQLite file backing the durable event queue.
    pub event_store_path: PathBuf,
    /// Timeout applied to every outbound HTTP call.
    pub http_timeout: Duration,
    /// Pattern source: local path or http(s) URL. `None` uses the
    /// built-in defaults.
    pub patterns_source: Option<String>,
    /// Directory for cached pattern documents.
    pub patterns_cache_dir: PathBuf,
    /// How long a cached pattern document stays fresh.
    pub patterns_cache_ttl: Duration,
    /// Interval between statistics collection cycles.
    pub stats_interval: Duration,
    /// Metric sink selection.
    pub sink: SinkSettings,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            logs_dir: PathBuf::from("./logs"),
            log_pattern: "*.log".to_string(),
            from_beginning: false,
            poll_interval: Duration::from_secs(1),
            tail_interval: Duration::from_millis(100),
            event_endpoint: "http://localhost:8000/api/events".to_string(),
            event_store_path: PathBuf::from("./pglens-events.db"),
            http_timeout: Duration::from_secs(10),
            patterns_source: None,
            patterns_cache_dir: PathBuf::from("./patterns_cache"),
            patterns_cache_ttl: Duration::from_secs(3600),
            stats_interval: Duration::from_secs(15),
            sink: SinkSettings::default(),
        }
    }
}

/// Startup-time configuration error. Fatal before any pipeline begins.
#[derive(Debug)]
pub enum ConfigError {
    /// A sink variant was selected without one of its required parameters.
    MissingSinkParameter {
        sink: &'static str,
        parameter: &'static str,
    },
    /// Unrecognized sink variant name.
    UnknownSinkType(String),
    /// Component construction failed (HTTP client, sqlite open, ...).
    Init(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingSinkParameter { sink, parameter } => {
                write!(f, "sink '{}' requires --sink-{}", sink, parameter)
            }
            ConfigError::UnknownSinkType(kind) => {
                write!(f, "unknown sink type '{}' (expected debug, http or sqlite)", kind)
            }
            ConfigError::Init(msg) => write!(f, "initialization failed: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
