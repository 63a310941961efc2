//! Log monitoring pipeline.
//!
//! Ties the tailer, the correlator and the event queue together: lines
//! come off the log file, completed records are persisted as PENDING,
//! and the dispatcher sweeps the queue on a fixed cadence. Everything
//! here runs on one thread; the statistics runner is the only other
//! thread in the agent.

pub mod correlator;
pub mod tailer;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::AgentConfig;
use crate::dispatch::EventDispatcher;
use crate::store::{EventStore, StoreError, query_cache::QueryCache};
use correlator::Correlator;
use tailer::{FileTailer, TailError, list_log_files};

#[derive(Debug)]
pub enum MonitorError {
    Tail(TailError),
    Store(StoreError),
}

impl std::fmt::Display for MonitorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorError::Tail(e) => write!(f, "{}", e),
            MonitorError::Store(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for MonitorError {}

impl From<TailError> for MonitorError {
    fn from(e: TailError) -> Self {
        MonitorError::Tail(e)
    }
}

impl From<StoreError> for MonitorError {
    fn from(e: StoreError) -> Self {
        MonitorError::Store(e)
    }
}

/// The log-side pipeline: tail, correlate, persist, dispatch.
pub struct LogMonitor {
    correlator: Correlator,
    store: EventStore,
    dispatcher: EventDispatcher,
    query_cache: Option<QueryCache>,
}

impl LogMonitor {
    pub fn new(
        correlator: Correlator,
        store: EventStore,
        dispatcher: EventDispatcher,
        query_cache: Option<QueryCache>,
    ) -> Self {
        Self {
            correlator,
            store,
            dispatcher,
            query_cache,
        }
    }

    /// Runs until `running` clears (follow mode) or until every
    /// matched file has been processed once (bulk mode). No matching
    /// log files is fatal; transient read errors are not.
    pub fn run(&mut self, config: &AgentConfig, running: &AtomicBool) -> Result<(), MonitorError> {
        let files = list_log_files(&config.logs_dir, &config.log_pattern)?;
        info!(files = files.len(), dir = %config.logs_dir.display(), "log files found");

        // Deliver whatever survived the previous run before reading
        // anything new.
        self.sweep();

        if config.from_beginning {
            self.run_bulk(&files, running)
        } else {
            // Lexicographic order puts the newest rotation last.
            let Some(latest) = files.last() else {
                // list_log_files errors instead of returning empty.
                return Ok(());
            };
            self.run_follow(latest, config, running)
        }
    }

    /// Process every file once, oldest first, then drain the queue.
    fn run_bulk(&mut self, files: &[std::path::PathBuf], running: &AtomicBool) -> Result<(), MonitorError> {
        for path in files {
            if !running.load(Ordering::SeqCst) {
                break;
            }
            info!(file = %path.display(), "processing log file");
            let mut tailer = match FileTailer::from_start(path.clone()) {
                Ok(t) => t,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "cannot open log file");
                    continue;
                }
            };
            loop {
                let lines = match tailer.read_new_lines() {
                    Ok(lines) => lines,
                    Err(e) => {
                        warn!(file = %path.display(), error = %e, "read failed");
                        break;
                    }
                };
                if lines.is_empty() {
                    break;
                }
                self.process_lines(&lines)?;
            }
            // Deliver what this file produced before moving on.
            self.sweep();
        }
        // Whatever is still buffered will not get a terminator now.
        if let Some(record) = self.correlator.flush() {
            self.store.save(&record)?;
        }
        self.sweep();
        Ok(())
    }

    /// Tail the newest file until shutdown.
    fn run_follow(
        &mut self,
        path: &Path,
        config: &AgentConfig,
        running: &AtomicBool,
    ) -> Result<(), MonitorError> {
        info!(file = %path.display(), "following log file");
        let mut tailer = FileTailer::at_end(path.to_path_buf()).map_err(TailError::Io)?;
        let mut last_sweep = Instant::now();

        while running.load(Ordering::SeqCst) {
            match tailer.read_new_lines() {
                Ok(lines) if !lines.is_empty() => {
                    self.process_lines(&lines)?;
                    self.sweep();
                    last_sweep = Instant::now();
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "read failed, retrying");
                }
            }

            // Sweep on the poll cadence even while the log is quiet, so
            // FAILED events retry without waiting for new traffic.
            if last_sweep.elapsed() >= config.poll_interval {
                self.sweep();
                last_sweep = Instant::now();
            }

            sleep_interruptible(config.tail_interval, running);
        }

        if let Some(record) = self.correlator.flush() {
            self.store.save(&record)?;
        }
        self.sweep();
        Ok(())
    }

    fn process_lines(&mut self, lines: &[String]) -> Result<(), StoreError> {
        for line in lines {
            let Some(record) = self.correlator.push(line) else {
                continue;
            };
            if let (Some(cache), Some(query)) = (&self.query_cache, record.query_text.as_deref()) {
                match cache.observe(query) {
                    Ok(true) => debug!("new distinct query observed"),
                    Ok(false) => {}
                    Err(e) => warn!(error = %e, "query cache update failed"),
                }
            }
            let id = self.store.save(&record)?;
            debug!(event_id = id, pattern = record.pattern_name.as_deref(), "event persisted");
        }
        Ok(())
    }

    /// One dispatcher pass. Store errors inside a sweep are logged, not
    /// fatal: the events stay queued for the next pass.
    fn sweep(&self) {
        match self.dispatcher.sweep(&self.store) {
            Ok(stats) if stats.attempted > 0 => {
                debug!(
                    attempted = stats.attempted,
                    sent = stats.sent,
                    failed = stats.failed,
                    "dispatch sweep"
                );
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "dispatch sweep failed"),
        }
    }
}

/// Sleep in slices so shutdown is not delayed by a long interval.
fn sleep_interruptible(interval: Duration, running: &AtomicBool) {
    let slice = Duration::from_millis(50);
    let mut remaining = interval;
    while remaining > Duration::ZERO && running.load(Ordering::SeqCst) {
        let sleep_time = remaining.min(slice);
        std::thread::sleep(sleep_time);
        remaining = remaining.saturating_sub(sleep_time);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::PatternSet;
    use crate::store::EventStatus;
    use std::fs;
    use std::sync::atomic::AtomicBool;

    fn write_log(path: &Path, body: &str) {
        fs::write(path, body).unwrap();
    }

    fn monitor(dir: &Path) -> LogMonitor {
        let store = EventStore::open(&dir.join("events.db")).unwrap();
        // Reserved port: every delivery attempt fails fast, events stay
        // queued as FAILED.
        let dispatcher =
            EventDispatcher::new("http://127.0.0.1:1/api/events", Duration::from_millis(200))
                .unwrap();
        let cache = QueryCache::open(&dir.join("events.db")).unwrap();
        LogMonitor::new(
            Correlator::new(PatternSet::defaults()),
            store,
            dispatcher,
            Some(cache),
        )
    }

    #[test]
    fn bulk_mode_persists_records_from_all_files() {
        let dir = tempfile::tempdir().unwrap();
        write_log(
            &dir.path().join("postgresql-1.log"),
            "2024-01-01 10:00:00.000 UTC [100] LOG:  execute S_1: SELECT * FROM a\n\
             2024-01-01 10:00:00.010 UTC [100] LOG:  duration: 1.5 ms  plan:\n",
        );
        write_log(
            &dir.path().join("postgresql-2.log"),
            "2024-01-01 11:00:00.000 UTC [101] LOG:  execute S_2: SELECT * FROM b\n\
             2024-01-01 11:00:00.020 UTC [101] LOG:  duration: 2.5 ms  plan:\n",
        );

        let config = AgentConfig {
            logs_dir: dir.path().to_path_buf(),
            from_beginning: true,
            ..AgentConfig::default()
        };
        let running = AtomicBool::new(true);
        let mut monitor = monitor(dir.path());
        monitor.run(&config, &running).unwrap();

        // Both records persisted; the per-file and final sweeps attempted
        // delivery, so both are FAILED and still queued for retry.
        assert_eq!(monitor.store.count().unwrap(), 2);
        let pending = monitor.store.list_pending().unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|r| r.status == EventStatus::Failed));
    }

    #[test]
    fn missing_log_directory_contents_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = AgentConfig {
            logs_dir: dir.path().to_path_buf(),
            from_beginning: true,
            ..AgentConfig::default()
        };
        let running = AtomicBool::new(true);
        let mut monitor = monitor(dir.path());
        // events.db does not match *.log, so nothing matches.
        assert!(matches!(
            monitor.run(&config, &running),
            Err(MonitorError::Tail(TailError::NoLogFiles { .. }))
        ));
    }

    #[test]
    fn bulk_mode_flushes_the_unterminated_tail_record() {
        let dir = tempfile::tempdir().unwrap();
        write_log(
            &dir.path().join("postgresql-1.log"),
            "2024-01-01 10:00:00.000 UTC [100] LOG:  execute S_1: SELECT * FROM a\n",
        );
        let config = AgentConfig {
            logs_dir: dir.path().to_path_buf(),
            from_beginning: true,
            ..AgentConfig::default()
        };
        let running = AtomicBool::new(true);
        let mut monitor = monitor(dir.path());
        monitor.run(&config, &running).unwrap();
        assert_eq!(monitor.store.count().unwrap(), 1);
    }
}
