//! Size- and time-triggered batching with retry
//!
//! Entries accumulate in a pending buffer. The buffer is flushed to the sink
//! when it reaches `batch_size`, when the background ticker fires every
//! `flush_interval` (adjustable at runtime), on explicit [`Batcher::flush`],
//! and on close.
//!
//! A delivery attempt appends every entry the sink has not yet accepted,
//! then flushes the sink. A failed attempt is retried after `retry_delay`
//! and resumes after the last accepted entry, so a partial failure never
//! duplicates entries. `max_retries` bounds the total number of attempts.
//!
//! Lock order is sink, then pending. Taking the sink lock before swapping the
//! pending buffer out keeps concurrent flushes in append order.

use crate::core::diagnostics::should_report;
use crate::core::error::{LoggerError, Result};
use crate::core::log_entry::LogEntry;
use crate::core::pool::EntryPool;
use crate::core::sink::Sink;
use crate::pipeline::writer::LogWriter;
use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, select, tick, unbounded, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatcherConfig {
    /// Pending entries that trigger a synchronous flush
    pub batch_size: usize,
    /// Period of the background flush
    pub flush_interval: Duration,
    /// Total delivery attempts per batch, at least 1
    pub max_retries: u32,
    /// Pause between failed attempts
    pub retry_delay: Duration,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl BatcherConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(LoggerError::config("batcher", "batch_size must be at least 1"));
        }
        if self.flush_interval.is_zero() {
            return Err(LoggerError::config(
                "batcher",
                "flush_interval must be greater than zero",
            ));
        }
        if self.max_retries == 0 {
            return Err(LoggerError::config(
                "batcher",
                "max_retries counts total attempts and must be at least 1",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct BatchMetrics {
    total_entries: AtomicU64,
    total_batches: AtomicU64,
    failed_batches: AtomicU64,
    failed_entries: AtomicU64,
    retry_count: AtomicU64,
    last_flush_time: Mutex<Option<DateTime<Utc>>>,
}

/// Copy of the batcher counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchMetricsSnapshot {
    /// Entries accepted by `write_entry`
    pub total_entries: u64,
    /// Batches delivered to the sink
    pub total_batches: u64,
    /// Batches given up after exhausting every attempt
    pub failed_batches: u64,
    /// Entries of failed batches the sink never accepted
    pub failed_entries: u64,
    /// Failed delivery attempts
    pub retry_count: u64,
    pub last_flush_time: Option<DateTime<Utc>>,
    pub average_batch_size: f64,
}

struct BatchShared {
    sink: Mutex<Box<dyn Sink>>,
    pending: Mutex<Vec<LogEntry>>,
    batch_size: AtomicUsize,
    max_retries: u32,
    retry_delay: Duration,
    metrics: BatchMetrics,
    pool: Option<Arc<EntryPool>>,
    closed: AtomicBool,
    background_failures: AtomicU64,
}

impl BatchShared {
    fn flush(&self) -> Result<()> {
        let mut sink = self.sink.lock();
        let batch = {
            let mut pending = self.pending.lock();
            if pending.is_empty() {
                return Ok(());
            }
            let capacity = self.batch_size.load(Ordering::Relaxed);
            mem::replace(&mut *pending, Vec::with_capacity(capacity))
        };

        let result = self.deliver(&mut **sink, &batch);
        drop(sink);

        if let Some(pool) = &self.pool {
            batch.into_iter().for_each(|entry| pool.put(entry));
        }
        result
    }

    fn deliver(&self, sink: &mut dyn Sink, batch: &[LogEntry]) -> Result<()> {
        let mut accepted = 0;
        let mut last_error = None;

        for attempt in 1..=self.max_retries {
            match Self::attempt(sink, batch, &mut accepted) {
                Ok(()) => {
                    self.metrics.total_batches.fetch_add(1, Ordering::Relaxed);
                    *self.metrics.last_flush_time.lock() = Some(Utc::now());
                    return Ok(());
                }
                Err(e) => {
                    self.metrics.retry_count.fetch_add(1, Ordering::Relaxed);
                    last_error = Some(e);
                    if attempt < self.max_retries && !self.retry_delay.is_zero() {
                        thread::sleep(self.retry_delay);
                    }
                }
            }
        }

        self.metrics.failed_batches.fetch_add(1, Ordering::Relaxed);
        self.metrics
            .failed_entries
            .fetch_add((batch.len() - accepted) as u64, Ordering::Relaxed);
        let last = last_error.unwrap_or_else(|| LoggerError::other("no delivery attempt made"));
        Err(LoggerError::retries_exhausted(self.max_retries, last))
    }

    /// Append what the sink has not accepted yet, then flush it
    fn attempt(sink: &mut dyn Sink, batch: &[LogEntry], accepted: &mut usize) -> Result<()> {
        for entry in &batch[*accepted..] {
            sink.append(entry)?;
            *accepted += 1;
        }
        sink.flush()
    }

    fn background_flush(&self) {
        if let Err(e) = self.flush() {
            let failures = self.background_failures.fetch_add(1, Ordering::Relaxed) + 1;
            if should_report(failures) {
                eprintln!(
                    "[LOGGER ERROR] Background batch flush failed ({} so far): {}",
                    failures, e
                );
            }
        }
    }
}

/// Buffers entries and delivers them to a sink in batches
///
/// # Example
///
/// ```
/// use rust_structured_logger::core::{LogEntry, LogLevel};
/// use rust_structured_logger::pipeline::{Batcher, BatcherConfig};
/// use rust_structured_logger::sinks::MemorySink;
/// use std::time::Duration;
///
/// let sink = MemorySink::new();
/// let handle = sink.handle();
/// let config = BatcherConfig {
///     batch_size: 2,
///     flush_interval: Duration::from_secs(60),
///     ..Default::default()
/// };
/// let batcher = Batcher::new(sink, config).unwrap();
///
/// batcher.write_entry(LogEntry::new(LogLevel::Info, "a")).unwrap();
/// assert_eq!(handle.len(), 0);
/// batcher.write_entry(LogEntry::new(LogLevel::Info, "b")).unwrap();
/// assert_eq!(handle.len(), 2);
///
/// batcher.close().unwrap();
/// ```
pub struct Batcher {
    shared: Arc<BatchShared>,
    ticker: Mutex<Option<(Sender<()>, JoinHandle<()>)>>,
    interval_tx: Sender<Duration>,
    flush_interval: Mutex<Duration>,
}

enum TickerEvent {
    Stop,
    Flush,
    Rearm(Duration),
}

impl Batcher {
    pub fn new<S: Sink + 'static>(sink: S, config: BatcherConfig) -> Result<Self> {
        Self::build(Box::new(sink), config, None)
    }

    /// Like [`Batcher::new`], returning delivered entries to `pool`
    pub fn with_entry_pool<S: Sink + 'static>(
        sink: S,
        config: BatcherConfig,
        pool: Arc<EntryPool>,
    ) -> Result<Self> {
        Self::build(Box::new(sink), config, Some(pool))
    }

    pub(crate) fn build(
        sink: Box<dyn Sink>,
        config: BatcherConfig,
        pool: Option<Arc<EntryPool>>,
    ) -> Result<Self> {
        config.validate()?;

        let shared = Arc::new(BatchShared {
            sink: Mutex::new(sink),
            pending: Mutex::new(Vec::with_capacity(config.batch_size)),
            batch_size: AtomicUsize::new(config.batch_size),
            max_retries: config.max_retries,
            retry_delay: config.retry_delay,
            metrics: BatchMetrics::default(),
            pool,
            closed: AtomicBool::new(false),
            background_failures: AtomicU64::new(0),
        });

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (interval_tx, interval_rx) = unbounded::<Duration>();
        let worker = Arc::clone(&shared);
        let interval = config.flush_interval;
        let handle = thread::Builder::new()
            .name("log-batcher".to_string())
            .spawn(move || {
                let mut ticker = tick(interval);
                loop {
                    let event = select! {
                        recv(stop_rx) -> _ => TickerEvent::Stop,
                        recv(interval_rx) -> msg => match msg {
                            Ok(interval) => TickerEvent::Rearm(interval),
                            Err(_) => TickerEvent::Stop,
                        },
                        recv(ticker) -> _ => TickerEvent::Flush,
                    };
                    match event {
                        TickerEvent::Stop => break,
                        TickerEvent::Flush => worker.background_flush(),
                        TickerEvent::Rearm(interval) => ticker = tick(interval),
                    }
                }
            })?;

        Ok(Self {
            shared,
            ticker: Mutex::new(Some((stop_tx, handle))),
            interval_tx,
            flush_interval: Mutex::new(interval),
        })
    }

    /// Buffer one entry, flushing synchronously once the batch is full
    pub fn write_entry(&self, entry: LogEntry) -> Result<()> {
        let full = {
            let mut pending = self.shared.pending.lock();
            // Checked under the pending lock so nothing lands after the final flush
            if self.is_closed() {
                drop(pending);
                if let Some(pool) = &self.shared.pool {
                    pool.put(entry);
                }
                return Err(LoggerError::WriterClosed);
            }
            pending.push(entry);
            pending.len() >= self.shared.batch_size.load(Ordering::Relaxed)
        };
        self.shared
            .metrics
            .total_entries
            .fetch_add(1, Ordering::Relaxed);

        if full {
            self.shared.flush()
        } else {
            Ok(())
        }
    }

    /// Deliver everything pending now
    pub fn flush(&self) -> Result<()> {
        self.shared.flush()
    }

    /// Stop the ticker, deliver what is pending and close the sink
    ///
    /// Only the first call does anything; later calls return `Ok(())`.
    pub fn close(&self) -> Result<()> {
        if self
            .shared
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        if let Some((stop_tx, handle)) = self.ticker.lock().take() {
            drop(stop_tx);
            if handle.join().is_err() {
                eprintln!("[LOGGER ERROR] Batcher ticker thread panicked");
            }
        }

        let flushed = self.shared.flush();
        let closed = self.shared.sink.lock().close();
        flushed.and(closed)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    pub fn pending_len(&self) -> usize {
        self.shared.pending.lock().len()
    }

    pub fn batch_size(&self) -> usize {
        self.shared.batch_size.load(Ordering::Relaxed)
    }

    pub fn flush_interval(&self) -> Duration {
        *self.flush_interval.lock()
    }

    /// Restart the background ticker with a new period
    pub fn set_flush_interval(&self, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(LoggerError::config(
                "batcher",
                "flush_interval must be greater than zero",
            ));
        }
        if self.is_closed() || self.interval_tx.send(interval).is_err() {
            return Err(LoggerError::WriterClosed);
        }
        *self.flush_interval.lock() = interval;
        Ok(())
    }

    /// Change the flush threshold; applies to the next write
    pub fn set_batch_size(&self, batch_size: usize) -> Result<()> {
        if batch_size == 0 {
            return Err(LoggerError::config("batcher", "batch_size must be at least 1"));
        }
        self.shared.batch_size.store(batch_size, Ordering::Relaxed);
        Ok(())
    }

    pub fn metrics(&self) -> BatchMetricsSnapshot {
        let m = &self.shared.metrics;
        let total_entries = m.total_entries.load(Ordering::Relaxed);
        let total_batches = m.total_batches.load(Ordering::Relaxed);
        BatchMetricsSnapshot {
            total_entries,
            total_batches,
            failed_batches: m.failed_batches.load(Ordering::Relaxed),
            failed_entries: m.failed_entries.load(Ordering::Relaxed),
            retry_count: m.retry_count.load(Ordering::Relaxed),
            last_flush_time: *m.last_flush_time.lock(),
            average_batch_size: if total_batches == 0 {
                0.0
            } else {
                total_entries as f64 / total_batches as f64
            },
        }
    }

    pub fn reset_metrics(&self) {
        let m = &self.shared.metrics;
        m.total_entries.store(0, Ordering::Relaxed);
        m.total_batches.store(0, Ordering::Relaxed);
        m.failed_batches.store(0, Ordering::Relaxed);
        m.failed_entries.store(0, Ordering::Relaxed);
        m.retry_count.store(0, Ordering::Relaxed);
        *m.last_flush_time.lock() = None;
    }
}

impl LogWriter for Batcher {
    fn write(&self, entry: LogEntry) -> Result<()> {
        self.write_entry(entry)
    }

    fn flush(&self) -> Result<()> {
        Batcher::flush(self)
    }

    fn close(&self) -> Result<()> {
        Batcher::close(self)
    }

    fn is_closed(&self) -> bool {
        Batcher::is_closed(self)
    }
}

impl Drop for Batcher {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            eprintln!("[LOGGER ERROR] Failed to close batcher on drop: {}", e);
        }
    }
}

impl fmt::Debug for Batcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Batcher")
            .field("batch_size", &self.batch_size())
            .field("pending", &self.pending_len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
