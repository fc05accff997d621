//! Logger metrics for observability
//!
//! Counts what happened to every call that reached the facade: written,
//! dropped on overload or after close, rejected by a filter or sampler, or
//! failed downstream. Also tracks write latency over a bounded window of
//! recent samples, uptime and throughput.

use super::log_level::LogLevel;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Latency samples kept for percentiles
pub const LATENCY_WINDOW: usize = 1000;

#[derive(Debug, Default)]
struct LevelStats {
    by_level: HashMap<LogLevel, u64>,
    last_log_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct LatencyStats {
    count: u64,
    total: Duration,
    min: Duration,
    max: Duration,
    /// Ring of the most recent samples
    samples: Vec<Duration>,
    next: usize,
}

impl LatencyStats {
    fn record(&mut self, latency: Duration) {
        if self.count == 0 || latency < self.min {
            self.min = latency;
        }
        self.max = self.max.max(latency);
        self.total += latency;
        self.count += 1;

        if self.samples.len() < LATENCY_WINDOW {
            self.samples.push(latency);
        } else {
            self.samples[self.next] = latency;
        }
        self.next = (self.next + 1) % LATENCY_WINDOW;
    }

    fn snapshot(&self) -> LatencySnapshot {
        if self.count == 0 {
            return LatencySnapshot::default();
        }
        let mut sorted = self.samples.clone();
        sorted.sort_unstable();
        let percentile = |p: f64| {
            let rank = ((sorted.len() - 1) as f64 * p).round() as usize;
            sorted[rank]
        };
        LatencySnapshot {
            count: self.count,
            min: self.min,
            max: self.max,
            avg: self.total / u32::try_from(self.count).unwrap_or(u32::MAX),
            p50: percentile(0.50),
            p90: percentile(0.90),
            p95: percentile(0.95),
            p99: percentile(0.99),
        }
    }
}

/// Write latency summary
///
/// `min`, `max` and `avg` cover every sample since the last reset; the
/// percentiles cover the most recent [`LATENCY_WINDOW`] samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LatencySnapshot {
    pub count: u64,
    pub min: Duration,
    pub max: Duration,
    pub avg: Duration,
    pub p50: Duration,
    pub p90: Duration,
    pub p95: Duration,
    pub p99: Duration,
}

/// Thread-safe metrics collector
///
/// # Example
///
/// ```
/// use rust_structured_logger::core::{LogLevel, MetricsCollector};
///
/// let metrics = MetricsCollector::new();
/// metrics.record_log(LogLevel::Info);
/// metrics.record_dropped();
///
/// let snapshot = metrics.snapshot();
/// assert_eq!(snapshot.total_logs, 1);
/// assert_eq!(snapshot.dropped_logs, 1);
/// assert_eq!(snapshot.logs_by_level.get(&LogLevel::Info), Some(&1));
/// ```
#[derive(Debug)]
pub struct MetricsCollector {
    total_logs: AtomicU64,
    dropped_logs: AtomicU64,
    filtered_logs: AtomicU64,
    sampled_out: AtomicU64,
    error_count: AtomicU64,

    /// Total and histogram change together under this lock
    levels: Mutex<LevelStats>,
    latency: Mutex<LatencyStats>,
    started: Mutex<Instant>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self {
            total_logs: AtomicU64::new(0),
            dropped_logs: AtomicU64::new(0),
            filtered_logs: AtomicU64::new(0),
            sampled_out: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            levels: Mutex::new(LevelStats::default()),
            latency: Mutex::new(LatencyStats::default()),
            started: Mutex::new(Instant::now()),
        }
    }
}

/// Owned copy of the counters at one point in time
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub total_logs: u64,
    pub dropped_logs: u64,
    pub filtered_logs: u64,
    pub sampled_out: u64,
    pub error_count: u64,
    pub logs_by_level: HashMap<LogLevel, u64>,
    pub last_log_time: Option<DateTime<Utc>>,
    pub latency: LatencySnapshot,
    /// Time since creation or the last reset
    pub uptime: Duration,
    /// Accepted logs per second of uptime
    pub throughput: f64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an entry accepted for writing
    pub fn record_log(&self, level: LogLevel) {
        let mut levels = self.levels.lock();
        self.total_logs.fetch_add(1, Ordering::Relaxed);
        *levels.by_level.entry(level).or_insert(0) += 1;
        levels.last_log_time = Some(Utc::now());
    }

    #[inline]
    pub fn record_dropped(&self) {
        self.dropped_logs.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_filtered(&self) {
        self.filtered_logs.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_sampled_out(&self) {
        self.sampled_out.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Record how long one write took
    pub fn record_latency(&self, latency: Duration) {
        self.latency.lock().record(latency);
    }

    pub fn latency(&self) -> LatencySnapshot {
        self.latency.lock().snapshot()
    }

    pub fn uptime(&self) -> Duration {
        self.started.lock().elapsed()
    }

    #[inline]
    pub fn total_logs(&self) -> u64 {
        self.total_logs.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn dropped_logs(&self) -> u64 {
        self.dropped_logs.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let latency = self.latency();
        let uptime = self.uptime();
        let levels = self.levels.lock();
        let total_logs = self.total_logs.load(Ordering::Relaxed);
        let secs = uptime.as_secs_f64();
        MetricsSnapshot {
            total_logs,
            dropped_logs: self.dropped_logs.load(Ordering::Relaxed),
            filtered_logs: self.filtered_logs.load(Ordering::Relaxed),
            sampled_out: self.sampled_out.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
            logs_by_level: levels.by_level.clone(),
            last_log_time: levels.last_log_time,
            latency,
            uptime,
            throughput: if secs > 0.0 {
                total_logs as f64 / secs
            } else {
                0.0
            },
        }
    }

    /// Reset all metrics to zero
    pub fn reset(&self) {
        let mut levels = self.levels.lock();
        self.total_logs.store(0, Ordering::Relaxed);
        self.dropped_logs.store(0, Ordering::Relaxed);
        self.filtered_logs.store(0, Ordering::Relaxed);
        self.sampled_out.store(0, Ordering::Relaxed);
        self.error_count.store(0, Ordering::Relaxed);
        levels.by_level.clear();
        levels.last_log_time = None;
        *self.latency.lock() = LatencyStats::default();
        *self.started.lock() = Instant::now();
    }

    /// Get drop rate as a percentage (0.0 - 100.0)
    ///
    /// Returns 0.0 if nothing has been logged.
    pub fn drop_rate(&self) -> f64 {
        self.snapshot().drop_rate()
    }
}

impl MetricsSnapshot {
    pub fn drop_rate(&self) -> f64 {
        let dropped = self.dropped_logs as f64;
        let total = self.total_logs as f64 + dropped;
        if total == 0.0 {
            0.0
        } else {
            (dropped / total) * 100.0
        }
    }

    /// Sum of the per-level histogram
    pub fn level_total(&self) -> u64 {
        self.logs_by_level.values().sum()
    }
}
