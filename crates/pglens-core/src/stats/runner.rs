//! Background statistics thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::StatsCollector;
use crate::sink::{MetricSink, flatten_snapshot};

/// Owns the collection thread: collect, flatten, write to the sink,
/// sleep, repeat until stopped. The sink is closed on the thread
/// before it exits.
pub struct StatsRunner {
    handle: JoinHandle<()>,
    running: Arc<AtomicBool>,
}

impl StatsRunner {
    pub fn start(
        mut collector: StatsCollector,
        mut sink: Box<dyn MetricSink>,
        interval: Duration,
    ) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();

        let handle = std::thread::spawn(move || {
            info!(interval_secs = interval.as_secs(), "statistics thread started");
            while flag.load(Ordering::SeqCst) {
                match collector.collect() {
                    Ok(snapshot) => {
                        let metrics = flatten_snapshot(&snapshot);
                        debug!(metrics = metrics.len(), "statistics cycle complete");
                        if let Err(e) = sink.write(&metrics, snapshot.collected_at) {
                            warn!(error = %e, "metric sink write failed");
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "statistics collection failed");
                    }
                }

                // Sleep with periodic checks for the shutdown flag.
                let slice = Duration::from_millis(100);
                let mut remaining = interval;
                while remaining > Duration::ZERO && flag.load(Ordering::SeqCst) {
                    let sleep_time = remaining.min(slice);
                    std::thread::sleep(sleep_time);
                    remaining = remaining.saturating_sub(sleep_time);
                }
            }
            sink.close();
            info!("statistics thread stopped");
        });

        Self { handle, running }
    }

    /// Signals the thread and waits for it to finish its current cycle.
    pub fn stop(self) {
        self.running.store(false, Ordering::SeqCst);
        if self.handle.join().is_err() {
            warn!("statistics thread panicked");
        }
    }
}
