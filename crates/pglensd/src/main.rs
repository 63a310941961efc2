//! pglensd - PostgreSQL observability agent daemon.
//!
//! Tails PostgreSQL log files, reconstructs query/plan events and ships
//! them to a remote collector, while a background thread samples the
//! cumulative pg_stat views into a configurable metric sink.

use tikv_jemallocator::Jemalloc;
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

use pglens_core::config::{AgentConfig, SinkSettings};
use pglens_core::dispatch::EventDispatcher;
use pglens_core::monitor::LogMonitor;
use pglens_core::monitor::correlator::Correlator;
use pglens_core::patterns::store::PatternStore;
use pglens_core::sink::create_sink;
use pglens_core::stats::runner::StatsRunner;
use pglens_core::stats::StatsCollector;
use pglens_core::store::query_cache::QueryCache;
use pglens_core::store::EventStore;

/// PostgreSQL observability agent daemon.
#[derive(Parser)]
#[command(name = "pglensd", about = "PostgreSQL observability agent", version)]
struct Args {
    /// Directory containing PostgreSQL log files.
    #[arg(short, long, default_value = "./logs")]
    logs_dir: PathBuf,

    /// Glob matched against file names in the logs directory.
    #[arg(long, default_value = "*.log")]
    log_pattern: String,

    /// Process every matching file once from the beginning, then exit,
    /// instead of following the newest file.
    #[arg(long)]
    from_beginning: bool,

    /// Dispatcher sweep interval in seconds while the log is quiet.
    #[arg(long, default_value = "1")]
    poll_interval: u64,

    /// Sleep between empty log reads, in milliseconds.
    #[arg(long, default_value = "100")]
    tail_interval: u64,

    /// Endpoint receiving reconstructed query events.
    #[arg(short, long, default_value = "http://localhost:8000/api/events")]
    endpoint: String,

    /// SQLite file backing the durable event queue.
    #[arg(long, default_value = "./pglens-events.db")]
    event_db: PathBuf,

    /// Timeout for every outbound HTTP call, in seconds.
    #[arg(long, default_value = "10")]
    http_timeout: u64,

    /// Pattern definitions: local path or http(s) URL.
    /// Built-in defaults are used when omitted.
    #[arg(long, env = "PGLENS_PATTERNS_SOURCE")]
    patterns_source: Option<String>,

    /// Directory for cached pattern documents.
    #[arg(long, default_value = "./patterns_cache")]
    patterns_cache_dir: PathBuf,

    /// How long a cached pattern document stays fresh, in seconds.
    #[arg(long, default_value = "3600")]
    patterns_cache_ttl: u64,

    /// Enable periodic pg_stat collection.
    /// Uses PGHOST/PGPORT/PGUSER/PGPASSWORD/PGDATABASE for connection.
    /// Disable with --stats=false.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    stats: bool,

    /// Statistics collection interval in seconds.
    #[arg(long, default_value = "15")]
    stats_interval: u64,

    /// Metric sink: debug, http or sqlite.
    #[arg(long, default_value = "debug")]
    sink: String,

    /// HTTP sink endpoint (required for --sink http).
    #[arg(long)]
    sink_endpoint: Option<String>,

    /// Bearer token for the HTTP sink.
    #[arg(long, env = "PGLENS_SINK_API_KEY")]
    sink_api_key: Option<String>,

    /// Database file for the sqlite sink (required for --sink sqlite).
    #[arg(long)]
    sink_db_path: Option<PathBuf>,

    /// Compact JSON in the debug sink instead of pretty-printed.
    #[arg(long)]
    compact: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn into_config(self) -> AgentConfig {
        AgentConfig {
            logs_dir: self.logs_dir,
            log_pattern: self.log_pattern,
            from_beginning: self.from_beginning,
            poll_interval: Duration::from_secs(self.poll_interval),
            tail_interval: Duration::from_millis(self.tail_interval),
            event_endpoint: self.endpoint,
            event_store_path: self.event_db,
            http_timeout: Duration::from_secs(self.http_timeout),
            patterns_source: self.patterns_source,
            patterns_cache_dir: self.patterns_cache_dir,
            patterns_cache_ttl: Duration::from_secs(self.patterns_cache_ttl),
            stats_interval: Duration::from_secs(self.stats_interval),
            sink: SinkSettings {
                kind: self.sink,
                endpoint: self.sink_endpoint,
                api_key: self.sink_api_key,
                db_path: self.sink_db_path,
                pretty: !self.compact,
            },
        }
    }
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("pglensd={}", level).parse().expect("valid directive"))
        .add_directive(format!("pglens_core={}", level).parse().expect("valid directive"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let stats_enabled = args.stats;
    let config = args.into_config();

    info!("pglensd {} starting", env!("CARGO_PKG_VERSION"));
    info!(
        "Config: logs={}, pattern={}, endpoint={}, event_db={}",
        config.logs_dir.display(),
        config.log_pattern,
        config.event_endpoint,
        config.event_store_path.display()
    );

    // Sink construction validates variant parameters; fail before any
    // pipeline starts.
    let sink = match create_sink(&config.sink, config.http_timeout) {
        Ok(sink) => sink,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    // Setup graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    // Patterns: remote/local source with on-disk cache, falling back
    // to built-in defaults. Never fatal.
    let patterns = PatternStore::new(
        config.patterns_source.clone(),
        config.patterns_cache_dir.clone(),
        config.patterns_cache_ttl,
        config.http_timeout,
    )
    .load();
    info!(
        "Patterns loaded: {}",
        patterns.names().collect::<Vec<_>>().join(", ")
    );

    let store = match EventStore::open(&config.event_store_path) {
        Ok(store) => store,
        Err(e) => {
            error!("Cannot open event store: {}", e);
            std::process::exit(1);
        }
    };

    let query_cache = match QueryCache::open(&config.event_store_path) {
        Ok(cache) => Some(cache),
        Err(e) => {
            warn!("Query cache disabled: {}", e);
            None
        }
    };

    let dispatcher = match EventDispatcher::new(config.event_endpoint.clone(), config.http_timeout)
    {
        Ok(dispatcher) => dispatcher,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    // Statistics run on their own thread; the log pipeline owns main.
    let stats_runner = if stats_enabled {
        match StatsCollector::from_env() {
            Ok(collector) => {
                info!(
                    "Statistics collection: enabled, every {}s, sink={}",
                    config.stats_interval.as_secs(),
                    config.sink.kind
                );
                Some(StatsRunner::start(collector, sink, config.stats_interval))
            }
            Err(e) => {
                warn!("Statistics collection: disabled ({})", e);
                None
            }
        }
    } else {
        info!("Statistics collection: disabled");
        None
    };

    let mut monitor = LogMonitor::new(
        Correlator::new(patterns),
        store,
        dispatcher,
        query_cache,
    );

    let exit_code = match monitor.run(&config, &running) {
        Ok(()) => 0,
        Err(e) => {
            error!("Log monitor failed: {}", e);
            1
        }
    };

    // Graceful shutdown
    info!("Shutting down...");
    running.store(false, Ordering::SeqCst);
    if let Some(runner) = stats_runner {
        runner.stop();
    }
    info!("Shutdown complete");

    std::process::exit(exit_code);
}
