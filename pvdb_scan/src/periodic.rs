//! Periodic scan threads.
//!
//! One thread per distinct scan period, paced by absolute deadlines so
//! timing does not drift with per-cycle processing cost. When a cycle
//! runs past its deadline the pacer skips ahead to the next future
//! deadline instead of bursting to catch up, and counts the overrun.

use pvdb_engine::sched::{CallbackScheduler, EventSink};
use pvdb_engine::{ProcessContext, Record, process};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// O(1) per-cycle timing statistics for one scan thread.
#[derive(Debug, Clone)]
pub struct ScanStats {
    /// Total scan cycles executed.
    pub cycle_count: u64,
    /// Last cycle duration [ns].
    pub last_cycle_ns: u64,
    /// Minimum cycle duration [ns].
    pub min_cycle_ns: u64,
    /// Maximum cycle duration [ns].
    pub max_cycle_ns: u64,
    /// Running sum for average computation.
    pub sum_cycle_ns: u64,
    /// Cycles that ran past their deadline.
    pub overruns: u64,
}

impl ScanStats {
    pub const fn new() -> Self {
        Self {
            cycle_count: 0,
            last_cycle_ns: 0,
            min_cycle_ns: u64::MAX,
            max_cycle_ns: 0,
            sum_cycle_ns: 0,
            overruns: 0,
        }
    }

    /// Record one cycle. O(1), no allocation.
    #[inline]
    pub fn record(&mut self, duration: Duration) {
        let ns = duration.as_nanos() as u64;
        self.cycle_count += 1;
        self.last_cycle_ns = ns;
        if ns < self.min_cycle_ns {
            self.min_cycle_ns = ns;
        }
        if ns > self.max_cycle_ns {
            self.max_cycle_ns = ns;
        }
        self.sum_cycle_ns += ns;
    }

    /// Average cycle time [ns] (0 if no cycles yet).
    #[inline]
    pub fn avg_cycle_ns(&self) -> u64 {
        if self.cycle_count == 0 {
            0
        } else {
            self.sum_cycle_ns / self.cycle_count
        }
    }
}

impl Default for ScanStats {
    fn default() -> Self {
        Self::new()
    }
}

struct ScanThread {
    period: Duration,
    handle: JoinHandle<()>,
    stats: Arc<Mutex<ScanStats>>,
}

/// Owner of all periodic scan threads.
///
/// Each distinct period gets one named thread that processes its group
/// in order every cycle. `stop` signals every thread and joins them.
pub struct PeriodicScanner {
    shutdown: Arc<AtomicBool>,
    threads: Vec<ScanThread>,
}

impl PeriodicScanner {
    /// Spawn one scan thread per group.
    ///
    /// Groups with no records are skipped. Thread names carry the
    /// period ("scan-100ms") for log correlation.
    pub fn start(
        groups: &[(Duration, Vec<Arc<Record>>)],
        scheduler: Arc<dyn CallbackScheduler>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut threads = Vec::with_capacity(groups.len());

        for (period, records) in groups {
            if records.is_empty() {
                continue;
            }
            let stats = Arc::new(Mutex::new(ScanStats::new()));
            let thread_stats = Arc::clone(&stats);
            let thread_shutdown = Arc::clone(&shutdown);
            let thread_scheduler = Arc::clone(&scheduler);
            let thread_events = Arc::clone(&events);
            let thread_records: Vec<Arc<Record>> = records.clone();
            let record_count = thread_records.len();
            let period = *period;

            let handle = std::thread::Builder::new()
                .name(format!("scan-{}ms", period.as_millis()))
                .spawn(move || {
                    scan_loop(
                        period,
                        &thread_records,
                        &*thread_scheduler,
                        &*thread_events,
                        &thread_shutdown,
                        &thread_stats,
                    );
                })
                .expect("failed to spawn scan thread");

            debug!(
                period_ms = period.as_millis() as u64,
                records = record_count,
                "scan thread started"
            );
            threads.push(ScanThread {
                period,
                handle,
                stats,
            });
        }

        Self { shutdown, threads }
    }

    /// Snapshot the statistics of every scan thread.
    pub fn stats(&self) -> Vec<(Duration, ScanStats)> {
        self.threads
            .iter()
            .map(|t| {
                (
                    t.period,
                    t.stats.lock().expect("scan stats lock poisoned").clone(),
                )
            })
            .collect()
    }

    /// Signal all scan threads and wait for them to exit.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        for thread in self.threads.drain(..) {
            let _ = thread.handle.join();
        }
        info!("periodic scanner stopped");
    }
}

impl Drop for PeriodicScanner {
    fn drop(&mut self) {
        self.stop();
    }
}

fn scan_loop(
    period: Duration,
    records: &[Arc<Record>],
    scheduler: &dyn CallbackScheduler,
    events: &dyn EventSink,
    shutdown: &AtomicBool,
    stats: &Mutex<ScanStats>,
) {
    let ctx = ProcessContext { scheduler, events };
    let mut next_deadline = Instant::now() + period;

    while !shutdown.load(Ordering::Acquire) {
        let cycle_start = Instant::now();
        for record in records {
            if let Err(err) = process(record, &ctx) {
                warn!(record = record.name(), %err, "scan processing failed");
            }
        }
        let duration = cycle_start.elapsed();

        {
            let mut stats = stats.lock().expect("scan stats lock poisoned");
            stats.record(duration);
            let now = Instant::now();
            if now >= next_deadline {
                stats.overruns += 1;
                // Skip missed deadlines rather than bursting.
                while next_deadline <= now {
                    next_deadline += period;
                }
            }
        }

        // Sleep in short slices so shutdown is prompt for slow scans.
        loop {
            if shutdown.load(Ordering::Acquire) {
                return;
            }
            let now = Instant::now();
            if now >= next_deadline {
                break;
            }
            let remaining = next_deadline.duration_since(now);
            std::thread::sleep(remaining.min(Duration::from_millis(50)));
        }
        next_deadline += period;
    }
}
