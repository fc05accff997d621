//! Asynchronous dispatch through a bounded queue and a worker pool
//!
//! Producers enqueue without blocking under the default overflow policy.
//! Each worker keeps a local batch and hands it downstream when it is full,
//! when the worker has been idle for `worker_idle_flush`, or when a flush
//! request arrives on its control channel. A flusher thread sends those
//! requests every `flush_interval`.
//!
//! The queue is FIFO, so with a single worker the downstream sees entries in
//! enqueue order. With several workers, entries from different batches may
//! interleave downstream.
//!
//! Close order: stop the flusher, signal cancellation, drop the queue sender,
//! let workers drain every queued entry, join them, then flush and close the
//! downstream writer.

use crate::core::diagnostics::{panic_message, should_report};
use crate::core::error::{LoggerError, Result};
use crate::core::log_entry::LogEntry;
use crate::core::metrics::MetricsCollector;
use crate::core::overflow_policy::{OverflowCallback, OverflowPolicy};
use crate::core::pool::EntryPool;
use crate::pipeline::writer::LogWriter;
use chrono::{DateTime, Utc};
use crossbeam_channel::{
    bounded, select, tick, Receiver, SendTimeoutError, Sender, TrySendError,
};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::fmt;
use std::mem;
use std::num::NonZeroUsize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;
pub const DEFAULT_WORKER_BATCH_SIZE: usize = 100;
pub const DEFAULT_WORKER_IDLE_FLUSH: Duration = Duration::from_millis(10);
pub const DEFAULT_DISPATCH_FLUSH_INTERVAL: Duration = Duration::from_millis(100);

/// Evictions attempted under `DropOldest` before the new entry is dropped
const DROP_OLDEST_ATTEMPTS: usize = 3;

/// Worker count matching the available parallelism
pub fn default_workers() -> usize {
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    pub queue_capacity: usize,
    pub workers: usize,
    /// Entries a worker collects before writing downstream
    pub worker_batch_size: usize,
    /// A worker with a partial batch writes it after this much idle time
    pub worker_idle_flush: Duration,
    /// Period of flush requests sent to every worker
    pub flush_interval: Duration,
    pub overflow_policy: OverflowPolicy,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            workers: default_workers(),
            worker_batch_size: DEFAULT_WORKER_BATCH_SIZE,
            worker_idle_flush: DEFAULT_WORKER_IDLE_FLUSH,
            flush_interval: DEFAULT_DISPATCH_FLUSH_INTERVAL,
            overflow_policy: OverflowPolicy::default(),
        }
    }
}

impl DispatcherConfig {
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(LoggerError::config(
                "dispatcher",
                "queue_capacity must be at least 1",
            ));
        }
        if self.workers == 0 {
            return Err(LoggerError::config("dispatcher", "workers must be at least 1"));
        }
        if self.worker_batch_size == 0 {
            return Err(LoggerError::config(
                "dispatcher",
                "worker_batch_size must be at least 1",
            ));
        }
        if self.worker_idle_flush.is_zero() || self.flush_interval.is_zero() {
            return Err(LoggerError::config(
                "dispatcher",
                "flush intervals must be greater than zero",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct DispatchMetrics {
    enqueued: AtomicU64,
    processed: AtomicU64,
    dropped: AtomicU64,
    rejected_after_close: AtomicU64,
    flush_count: AtomicU64,
    write_errors: AtomicU64,
    last_flush_time: Mutex<Option<DateTime<Utc>>>,
}

/// Copy of the dispatcher counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatcherMetricsSnapshot {
    /// Entries accepted into the queue
    pub enqueued: u64,
    /// Entries handed to the downstream writer
    pub processed: u64,
    /// Entries lost to overflow, evicted ones included
    pub dropped: u64,
    /// Entries offered after close
    pub rejected_after_close: u64,
    /// Batches written downstream
    pub flush_count: u64,
    /// Downstream batch writes that failed or panicked
    pub write_errors: u64,
    pub queue_depth: usize,
    pub last_flush_time: Option<DateTime<Utc>>,
}

/// Shared objects a dispatcher reports into besides its own counters
#[derive(Default)]
pub(crate) struct Attachments {
    /// Receives dropped entries
    pub pool: Option<Arc<EntryPool>>,
    pub on_overflow: Option<OverflowCallback>,
    /// Facade metrics that also count overflow drops
    pub collector: Option<Arc<MetricsCollector>>,
}

/// Flush request delivered on a worker's control channel
struct FlushRequest {
    ack: Option<Sender<()>>,
}

struct DispatchShared {
    downstream: Arc<dyn LogWriter>,
    metrics: DispatchMetrics,
    pool: Option<Arc<EntryPool>>,
    on_overflow: Option<OverflowCallback>,
    collector: Option<Arc<MetricsCollector>>,
    worker_batch_size: usize,
}

impl DispatchShared {
    fn release(&self, entry: LogEntry) {
        if let Some(pool) = &self.pool {
            pool.put(entry);
        }
    }

    fn record_drop(&self, entry: LogEntry, alert: bool) {
        self.release(entry);
        let dropped = self.metrics.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(collector) = &self.collector {
            collector.record_dropped();
        }
        if !alert {
            return;
        }
        if should_report(dropped) {
            eprintln!(
                "[LOGGER WARNING] Dispatch queue full, {} logs dropped. \
                 Consider increasing queue_capacity or using a different overflow policy.",
                dropped
            );
        }
        if let Some(callback) = &self.on_overflow {
            callback(dropped);
        }
    }

    fn reject(&self, entry: LogEntry) -> Result<()> {
        self.release(entry);
        self.metrics
            .rejected_after_close
            .fetch_add(1, Ordering::Relaxed);
        Err(LoggerError::WriterClosed)
    }

    /// Hand a worker's batch downstream, leaving an empty batch behind
    fn write_batch(&self, batch: &mut Vec<LogEntry>) {
        if batch.is_empty() {
            return;
        }
        let count = batch.len() as u64;
        let entries = mem::replace(batch, Vec::with_capacity(self.worker_batch_size));

        let result = catch_unwind(AssertUnwindSafe(|| self.downstream.write_batch(entries)));
        self.metrics.processed.fetch_add(count, Ordering::Relaxed);
        self.metrics.flush_count.fetch_add(1, Ordering::Relaxed);
        *self.metrics.last_flush_time.lock() = Some(Utc::now());

        let failure = match result {
            Ok(Ok(())) => return,
            Ok(Err(e)) => format!("failed: {}", e),
            Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
        };
        let errors = self.metrics.write_errors.fetch_add(1, Ordering::Relaxed) + 1;
        if should_report(errors) {
            eprintln!(
                "[LOGGER ERROR] Downstream batch write {} ({} errors so far)",
                failure, errors
            );
        }
    }
}

struct Worker {
    shared: Arc<DispatchShared>,
    entries: Receiver<LogEntry>,
    control: Receiver<FlushRequest>,
    cancel: Receiver<()>,
    idle_flush: Duration,
}

impl Worker {
    fn run(self) {
        let idle = tick(self.idle_flush);
        let batch_size = self.shared.worker_batch_size;
        let mut batch = Vec::with_capacity(batch_size);

        loop {
            select! {
                recv(self.entries) -> msg => match msg {
                    Ok(entry) => {
                        batch.push(entry);
                        if batch.len() >= batch_size {
                            self.shared.write_batch(&mut batch);
                        }
                    }
                    Err(_) => break,
                },
                recv(self.control) -> msg => {
                    if let Ok(request) = msg {
                        self.take_queued(&mut batch);
                        self.shared.write_batch(&mut batch);
                        if let Some(ack) = request.ack {
                            let _ = ack.send(());
                        }
                    }
                },
                recv(idle) -> _ => self.shared.write_batch(&mut batch),
                recv(self.cancel) -> _ => {
                    self.drain(&mut batch);
                    break;
                },
            }
        }

        self.shared.write_batch(&mut batch);
    }

    /// Pull what is queued right now into the local batch
    fn take_queued(&self, batch: &mut Vec<LogEntry>) {
        let queued = self.entries.len();
        for entry in self.entries.try_iter().take(queued) {
            batch.push(entry);
            if batch.len() >= self.shared.worker_batch_size {
                self.shared.write_batch(batch);
            }
        }
    }

    /// Consume entries until the queue is closed and empty
    fn drain(&self, batch: &mut Vec<LogEntry>) {
        while let Ok(entry) = self.entries.recv() {
            batch.push(entry);
            if batch.len() >= self.shared.worker_batch_size {
                self.shared.write_batch(batch);
            }
        }
    }
}

/// Bounded-queue, multi-worker front for another [`LogWriter`]
///
/// # Example
///
/// ```
/// use rust_structured_logger::core::{LogEntry, LogLevel};
/// use rust_structured_logger::pipeline::{DirectWriter, Dispatcher, DispatcherConfig};
/// use rust_structured_logger::sinks::MemorySink;
/// use std::sync::Arc;
///
/// let sink = MemorySink::new();
/// let handle = sink.handle();
/// let config = DispatcherConfig { queue_capacity: 10, workers: 1, ..Default::default() };
/// let dispatcher = Dispatcher::new(Arc::new(DirectWriter::new(sink)), config).unwrap();
///
/// for i in 0..5 {
///     dispatcher.log(LogEntry::new(LogLevel::Info, format!("msg {}", i))).unwrap();
/// }
/// dispatcher.close().unwrap();
/// assert_eq!(handle.len(), 5);
/// ```
pub struct Dispatcher {
    shared: Arc<DispatchShared>,
    policy: OverflowPolicy,
    sender: RwLock<Option<Sender<LogEntry>>>,
    /// Kept for queue depth and `DropOldest` eviction
    receiver: Receiver<LogEntry>,
    control: Vec<Sender<FlushRequest>>,
    cancel: Mutex<Option<Sender<()>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    flusher: Mutex<Option<(Sender<()>, JoinHandle<()>)>>,
    closed: AtomicBool,
}

impl Dispatcher {
    pub fn new(downstream: Arc<dyn LogWriter>, config: DispatcherConfig) -> Result<Self> {
        Self::build(downstream, config, Attachments::default())
    }

    /// Like [`Dispatcher::new`], calling `callback` with the drop total on overflow alerts
    pub fn with_overflow_callback(
        downstream: Arc<dyn LogWriter>,
        config: DispatcherConfig,
        callback: OverflowCallback,
    ) -> Result<Self> {
        let attachments = Attachments {
            on_overflow: Some(callback),
            ..Default::default()
        };
        Self::build(downstream, config, attachments)
    }

    pub(crate) fn build(
        downstream: Arc<dyn LogWriter>,
        config: DispatcherConfig,
        attachments: Attachments,
    ) -> Result<Self> {
        config.validate()?;

        let shared = Arc::new(DispatchShared {
            downstream,
            metrics: DispatchMetrics::default(),
            pool: attachments.pool,
            on_overflow: attachments.on_overflow,
            collector: attachments.collector,
            worker_batch_size: config.worker_batch_size,
        });

        let (sender, receiver) = bounded(config.queue_capacity);
        let (cancel_tx, cancel_rx) = bounded::<()>(0);

        let mut control = Vec::with_capacity(config.workers);
        let mut workers = Vec::with_capacity(config.workers);
        for id in 0..config.workers {
            let (control_tx, control_rx) = bounded(1);
            let worker = Worker {
                shared: Arc::clone(&shared),
                entries: receiver.clone(),
                control: control_rx,
                cancel: cancel_rx.clone(),
                idle_flush: config.worker_idle_flush,
            };
            let handle = thread::Builder::new()
                .name(format!("log-dispatch-{}", id))
                .spawn(move || worker.run())?;
            control.push(control_tx);
            workers.push(handle);
        }

        let flusher = Self::spawn_flusher(control.clone(), config.flush_interval)?;

        Ok(Self {
            shared,
            policy: config.overflow_policy,
            sender: RwLock::new(Some(sender)),
            receiver,
            control,
            cancel: Mutex::new(Some(cancel_tx)),
            workers: Mutex::new(workers),
            flusher: Mutex::new(Some(flusher)),
            closed: AtomicBool::new(false),
        })
    }

    fn spawn_flusher(
        control: Vec<Sender<FlushRequest>>,
        interval: Duration,
    ) -> Result<(Sender<()>, JoinHandle<()>)> {
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let handle = thread::Builder::new()
            .name("log-dispatch-flusher".to_string())
            .spawn(move || {
                let ticker = tick(interval);
                loop {
                    select! {
                        recv(stop_rx) -> _ => break,
                        recv(ticker) -> _ => {
                            // A worker with a request still pending is skipped
                            for ctl in &control {
                                let _ = ctl.try_send(FlushRequest { ack: None });
                            }
                        }
                    }
                }
            })?;
        Ok((stop_tx, handle))
    }

    /// Enqueue an entry
    ///
    /// Overflow is handled by the configured [`OverflowPolicy`] and only shows
    /// up in the metrics. After close the entry is counted as rejected and
    /// `WriterClosed` is returned.
    pub fn log(&self, entry: LogEntry) -> Result<()> {
        if self.is_closed() {
            return self.shared.reject(entry);
        }

        let guard = self.sender.read();
        let Some(sender) = guard.as_ref() else {
            return self.shared.reject(entry);
        };

        let outcome = match &self.policy {
            OverflowPolicy::DropNewest => self.try_enqueue(sender, entry, false),
            OverflowPolicy::AlertAndDrop => self.try_enqueue(sender, entry, true),
            OverflowPolicy::DropOldest => self.enqueue_evicting(sender, entry),
            OverflowPolicy::Block => match sender.send(entry) {
                Ok(()) => Ok(true),
                Err(err) => Err(err.into_inner()),
            },
            OverflowPolicy::BlockWithTimeout(timeout) => {
                match sender.send_timeout(entry, *timeout) {
                    Ok(()) => Ok(true),
                    Err(SendTimeoutError::Timeout(entry)) => {
                        self.shared.record_drop(entry, true);
                        Ok(false)
                    }
                    Err(SendTimeoutError::Disconnected(entry)) => Err(entry),
                }
            }
        };
        drop(guard);

        match outcome {
            Ok(true) => {
                self.shared.metrics.enqueued.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(entry) => self.shared.reject(entry),
        }
    }

    /// `Ok(true)` when enqueued, `Ok(false)` when dropped, `Err` when disconnected
    fn try_enqueue(
        &self,
        sender: &Sender<LogEntry>,
        entry: LogEntry,
        alert: bool,
    ) -> std::result::Result<bool, LogEntry> {
        match sender.try_send(entry) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(entry)) => {
                self.shared.record_drop(entry, alert);
                Ok(false)
            }
            Err(TrySendError::Disconnected(entry)) => Err(entry),
        }
    }

    fn enqueue_evicting(
        &self,
        sender: &Sender<LogEntry>,
        mut entry: LogEntry,
    ) -> std::result::Result<bool, LogEntry> {
        for _ in 0..DROP_OLDEST_ATTEMPTS {
            match sender.try_send(entry) {
                Ok(()) => return Ok(true),
                Err(TrySendError::Full(rejected)) => {
                    if let Ok(oldest) = self.receiver.try_recv() {
                        self.shared.record_drop(oldest, true);
                    }
                    entry = rejected;
                }
                Err(TrySendError::Disconnected(rejected)) => return Err(rejected),
            }
        }
        self.shared.record_drop(entry, true);
        Ok(false)
    }

    /// Ask every worker to write its batch, wait for all of them, then flush downstream
    pub fn sync(&self) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }

        let mut acks = Vec::with_capacity(self.control.len());
        for ctl in &self.control {
            let (ack_tx, ack_rx) = bounded(1);
            if ctl.send(FlushRequest { ack: Some(ack_tx) }).is_ok() {
                acks.push(ack_rx);
            }
        }
        // A worker that exits drops its request, which also ends the wait
        for ack in acks {
            let _ = ack.recv();
        }

        self.shared.downstream.flush()
    }

    /// Drain every queued entry, stop the workers, then flush and close downstream
    ///
    /// Only the first call does anything; later calls return `Ok(())`.
    pub fn close(&self) -> Result<()> {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        if let Some((stop_tx, handle)) = self.flusher.lock().take() {
            drop(stop_tx);
            if handle.join().is_err() {
                eprintln!("[LOGGER ERROR] Dispatch flusher thread panicked");
            }
        }

        drop(self.cancel.lock().take());
        drop(self.sender.write().take());

        let workers = mem::take(&mut *self.workers.lock());
        for handle in workers {
            if handle.join().is_err() {
                eprintln!("[LOGGER ERROR] Dispatch worker thread panicked");
            }
        }

        let flushed = self.shared.downstream.flush();
        let closed = self.shared.downstream.close();
        flushed.and(closed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn queue_depth(&self) -> usize {
        self.receiver.len()
    }

    pub fn worker_count(&self) -> usize {
        self.control.len()
    }

    pub fn overflow_policy(&self) -> &OverflowPolicy {
        &self.policy
    }

    pub fn metrics(&self) -> DispatcherMetricsSnapshot {
        let m = &self.shared.metrics;
        DispatcherMetricsSnapshot {
            enqueued: m.enqueued.load(Ordering::Relaxed),
            processed: m.processed.load(Ordering::Relaxed),
            dropped: m.dropped.load(Ordering::Relaxed),
            rejected_after_close: m.rejected_after_close.load(Ordering::Relaxed),
            flush_count: m.flush_count.load(Ordering::Relaxed),
            write_errors: m.write_errors.load(Ordering::Relaxed),
            queue_depth: self.queue_depth(),
            last_flush_time: *m.last_flush_time.lock(),
        }
    }

    pub fn reset_metrics(&self) {
        let m = &self.shared.metrics;
        m.enqueued.store(0, Ordering::Relaxed);
        m.processed.store(0, Ordering::Relaxed);
        m.dropped.store(0, Ordering::Relaxed);
        m.rejected_after_close.store(0, Ordering::Relaxed);
        m.flush_count.store(0, Ordering::Relaxed);
        m.write_errors.store(0, Ordering::Relaxed);
        *m.last_flush_time.lock() = None;
    }
}

impl LogWriter for Dispatcher {
    fn write(&self, entry: LogEntry) -> Result<()> {
        self.log(entry)
    }

    fn flush(&self) -> Result<()> {
        self.sync()
    }

    fn close(&self) -> Result<()> {
        Dispatcher::close(self)
    }

    fn is_closed(&self) -> bool {
        Dispatcher::is_closed(self)
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            eprintln!("[LOGGER ERROR] Failed to close dispatcher on drop: {}", e);
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("policy", &self.policy)
            .field("workers", &self.worker_count())
            .field("queue_depth", &self.queue_depth())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::LogLevel;
    use crate::pipeline::DirectWriter;
    use crate::sinks::{MemorySink, MemorySinkHandle};
    use std::sync::atomic::AtomicUsize;

    fn dispatcher(config: DispatcherConfig) -> (Dispatcher, MemorySinkHandle) {
        let sink = MemorySink::new();
        let handle = sink.handle();
        let dispatcher = Dispatcher::new(Arc::new(DirectWriter::new(sink)), config).unwrap();
        (dispatcher, handle)
    }

    fn single_worker(queue_capacity: usize, policy: OverflowPolicy) -> DispatcherConfig {
        DispatcherConfig {
            queue_capacity,
            workers: 1,
            worker_batch_size: 1,
            overflow_policy: policy,
            ..Default::default()
        }
    }

    fn entry(msg: impl AsRef<str>) -> LogEntry {
        LogEntry::new(LogLevel::Info, msg)
    }

    #[test]
    fn test_config_validation() {
        assert!(DispatcherConfig::default().validate().is_ok());
        let bad = DispatcherConfig {
            queue_capacity: 0,
            ..Default::default()
        };
        assert!(bad.validate().unwrap_err().is_configuration());
        let bad = DispatcherConfig {
            workers: 0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_close_delivers_everything_in_order() {
        let (dispatcher, handle) =
            dispatcher(single_worker(10, OverflowPolicy::AlertAndDrop));
        for i in 0..5 {
            dispatcher.log(entry(format!("msg {}", i))).unwrap();
        }
        dispatcher.close().unwrap();

        let expected: Vec<_> = (0..5).map(|i| format!("msg {}", i)).collect();
        assert_eq!(handle.messages(), expected);
        assert_eq!(handle.close_count(), 1);
    }

    #[test]
    fn test_sync_delivers_pending() {
        let config = DispatcherConfig {
            worker_batch_size: 1000,
            worker_idle_flush: Duration::from_secs(60),
            flush_interval: Duration::from_secs(60),
            workers: 2,
            ..Default::default()
        };
        let (dispatcher, handle) = dispatcher(config);
        for i in 0..50 {
            dispatcher.log(entry(i.to_string())).unwrap();
        }
        dispatcher.sync().unwrap();
        assert_eq!(handle.len(), 50);
        assert!(handle.flush_count() >= 1);
    }

    #[test]
    fn test_drop_newest_counts_overflow() {
        let (dispatcher, handle) = dispatcher(single_worker(1, OverflowPolicy::DropNewest));
        handle.set_delay(Some(Duration::from_millis(20)));

        for i in 0..20 {
            dispatcher.log(entry(i.to_string())).unwrap();
        }
        dispatcher.close().unwrap();

        let metrics = dispatcher.metrics();
        assert!(metrics.dropped > 0);
        assert_eq!(metrics.enqueued + metrics.dropped, 20);
        assert_eq!(handle.len() as u64, metrics.enqueued);
        assert_eq!(metrics.processed, metrics.enqueued);
    }

    #[test]
    fn test_alert_and_drop_invokes_callback() {
        let alerts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&alerts);
        let sink = MemorySink::new();
        let handle = sink.handle();
        handle.set_delay(Some(Duration::from_millis(20)));
        let dispatcher = Dispatcher::with_overflow_callback(
            Arc::new(DirectWriter::new(sink)),
            single_worker(1, OverflowPolicy::AlertAndDrop),
            Arc::new(move |_dropped| {
                counter.fetch_add(1, Ordering::Relaxed);
            }),
        )
        .unwrap();

        for i in 0..20 {
            dispatcher.log(entry(i.to_string())).unwrap();
        }
        dispatcher.close().unwrap();

        assert_eq!(alerts.load(Ordering::Relaxed) as u64, dispatcher.metrics().dropped);
        assert!(dispatcher.metrics().dropped > 0);
    }

    #[test]
    fn test_drop_oldest_keeps_newest() {
        let (dispatcher, handle) = dispatcher(single_worker(2, OverflowPolicy::DropOldest));
        handle.set_delay(Some(Duration::from_millis(50)));

        for i in 0..10 {
            dispatcher.log(entry(i.to_string())).unwrap();
        }
        dispatcher.close().unwrap();

        let messages = handle.messages();
        assert_eq!(messages.last().map(String::as_str), Some("9"));
        let metrics = dispatcher.metrics();
        assert!(metrics.dropped > 0);
        assert_eq!(messages.len() as u64 + metrics.dropped, 10);
    }

    #[test]
    fn test_block_loses_nothing() {
        let (dispatcher, handle) = dispatcher(single_worker(1, OverflowPolicy::Block));
        for i in 0..200 {
            dispatcher.log(entry(i.to_string())).unwrap();
        }
        dispatcher.close().unwrap();

        assert_eq!(handle.len(), 200);
        assert_eq!(dispatcher.metrics().dropped, 0);
    }

    #[test]
    fn test_log_after_close_is_rejected() {
        let (dispatcher, handle) = dispatcher(single_worker(10, OverflowPolicy::AlertAndDrop));
        dispatcher.close().unwrap();
        dispatcher.close().unwrap();

        let err = dispatcher.log(entry("late")).unwrap_err();
        assert!(matches!(err, LoggerError::WriterClosed));
        assert_eq!(dispatcher.metrics().rejected_after_close, 1);
        assert_eq!(dispatcher.metrics().dropped, 0);
        assert!(handle.is_empty());
        assert_eq!(handle.close_count(), 1);
    }

    #[test]
    fn test_downstream_errors_counted() {
        let (dispatcher, handle) = dispatcher(single_worker(10, OverflowPolicy::AlertAndDrop));
        handle.fail_next(1);
        dispatcher.log(entry("fails")).unwrap();
        dispatcher.sync().unwrap();

        assert_eq!(dispatcher.metrics().write_errors, 1);
        dispatcher.log(entry("works")).unwrap();
        dispatcher.close().unwrap();
        assert_eq!(handle.messages(), vec!["works"]);
    }

    #[test]
    fn test_entries_released_on_drop() {
        let pool = Arc::new(EntryPool::for_entries(64));
        let sink = MemorySink::new();
        let handle = sink.handle();
        handle.set_delay(Some(Duration::from_millis(20)));
        let dispatcher = Dispatcher::build(
            Arc::new(DirectWriter::new(sink)),
            single_worker(1, OverflowPolicy::DropNewest),
            Attachments {
                pool: Some(Arc::clone(&pool)),
                ..Default::default()
            },
        )
        .unwrap();

        for i in 0..10 {
            dispatcher.log(entry(i.to_string())).unwrap();
        }
        let dropped = dispatcher.metrics().dropped;
        assert!(dropped > 0);
        assert!(pool.idle() as u64 >= dropped.min(64));
        dispatcher.close().unwrap();
    }

    #[test]
    fn test_reset_metrics() {
        let (dispatcher, _handle) = dispatcher(single_worker(10, OverflowPolicy::AlertAndDrop));
        dispatcher.log(entry("x")).unwrap();
        dispatcher.sync().unwrap();
        dispatcher.reset_metrics();
        let metrics = dispatcher.metrics();
        assert_eq!(metrics.enqueued, 0);
        assert_eq!(metrics.processed, 0);
        assert!(metrics.last_flush_time.is_none());
    }
}
