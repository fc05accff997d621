//! Logger facade
//!
//! A [`Logger`] is a cheap handle. Clones share the whole pipeline; loggers
//! derived with [`Logger::with_field`] and friends also share the pipeline
//! but own their base fields and their level.
//!
//! Every call runs through the same stages, in order:
//!
//! 1. level gate (nothing is allocated for a disabled level)
//! 2. closed check (post-close calls are counted as dropped)
//! 3. pooled entry, base fields merged with call-site fields
//! 4. caller capture
//! 5. filter, then sampler (rejections are counted)
//! 6. metrics, then hooks
//! 7. writer (failures are counted, never returned)

use super::diagnostics::should_report;
use super::error::{LoggerError, Result};
use super::fields::{FieldValue, Fields};
use super::filter::Filter;
use super::hooks::HookSet;
use super::log_entry::LogEntry;
use super::log_level::LogLevel;
use super::metrics::{MetricsCollector, MetricsSnapshot};
use super::pool::EntryPool;
use super::sampling::Sampler;
use super::sink::Sink;
use crate::pipeline::writer::{DirectWriter, LogWriter};
use std::fmt;
use std::panic::Location;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Pipeline state shared by every handle of one logger
pub(crate) struct LoggerCore {
    pub(crate) writer: Arc<dyn LogWriter>,
    pub(crate) hooks: HookSet,
    pub(crate) filter: Option<Arc<dyn Filter>>,
    pub(crate) sampler: Option<Arc<dyn Sampler>>,
    pub(crate) metrics: Arc<MetricsCollector>,
    pub(crate) pool: Arc<EntryPool>,
    pub(crate) caller: bool,
    pub(crate) closed: AtomicBool,
}

impl Drop for LoggerCore {
    fn drop(&mut self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(e) = self.writer.close() {
            eprintln!("[LOGGER ERROR] Failed to close writer during shutdown: {}", e);
        }

        let dropped = self.metrics.dropped_logs();
        if dropped > 0 {
            eprintln!(
                "[LOGGER WARNING] Logger shutting down with {} dropped logs (drop rate: {:.2}%)",
                dropped,
                self.metrics.drop_rate()
            );
        }
    }
}

#[derive(Clone)]
pub struct Logger {
    core: Arc<LoggerCore>,
    level: Arc<AtomicU8>,
    fields: Arc<Fields>,
}

impl Logger {
    /// Synchronous logger writing straight to `sink` at `Info`
    ///
    /// # Example
    ///
    /// ```
    /// use rust_structured_logger::prelude::*;
    ///
    /// let sink = MemorySink::new();
    /// let handle = sink.handle();
    /// let logger = Logger::new(sink);
    ///
    /// logger.debug("hidden");
    /// logger.info("shown");
    /// assert_eq!(handle.messages(), vec!["shown"]);
    /// ```
    pub fn new<S: Sink + 'static>(sink: S) -> Self {
        let pool = Arc::new(EntryPool::default());
        let writer = DirectWriter::new(sink).with_entry_pool(Arc::clone(&pool));
        Self::from_parts(
            LoggerCore {
                writer: Arc::new(writer),
                hooks: HookSet::new(),
                filter: None,
                sampler: None,
                metrics: Arc::new(MetricsCollector::new()),
                pool,
                caller: true,
                closed: AtomicBool::new(false),
            },
            LogLevel::Info,
            Fields::new(),
        )
    }

    pub(crate) fn from_parts(core: LoggerCore, level: LogLevel, fields: Fields) -> Self {
        Self {
            core: Arc::new(core),
            level: Arc::new(AtomicU8::new(level.as_u8())),
            fields: Arc::new(fields),
        }
    }

    /// Minimum level this handle emits
    #[inline]
    pub fn level(&self) -> LogLevel {
        LogLevel::from_u8(self.level.load(Ordering::Relaxed))
    }

    /// Change the minimum level of this handle and its clones
    ///
    /// Loggers derived earlier through `with_field` keep their own level.
    pub fn set_level(&self, level: LogLevel) {
        self.level.store(level.as_u8(), Ordering::Relaxed);
    }

    #[inline]
    pub fn is_enabled(&self, level: LogLevel) -> bool {
        level >= self.level()
    }

    #[track_caller]
    pub fn log(&self, level: LogLevel, message: impl AsRef<str>) {
        self.dispatch(level, message.as_ref(), None);
    }

    #[track_caller]
    pub fn log_with_fields(&self, level: LogLevel, message: impl AsRef<str>, fields: Fields) {
        self.dispatch(level, message.as_ref(), Some(&fields));
    }

    #[track_caller]
    fn dispatch(&self, level: LogLevel, message: &str, call_fields: Option<&Fields>) {
        if !self.is_enabled(level) {
            return;
        }

        let core = &*self.core;
        if core.closed.load(Ordering::Acquire) {
            core.metrics.record_dropped();
            return;
        }

        let mut entry = core.pool.get();
        entry.fill(level, message);
        entry.fields.merge_from(&self.fields);
        if let Some(fields) = call_fields {
            entry.fields.merge_from(fields);
        }
        if core.caller {
            entry.set_location(Location::caller());
        }

        if let Some(filter) = &core.filter {
            if !filter.should_log(&entry) {
                core.metrics.record_filtered();
                core.pool.put(entry);
                return;
            }
        }
        if let Some(sampler) = &core.sampler {
            if !sampler.should_sample(&entry) {
                core.metrics.record_sampled_out();
                core.pool.put(entry);
                return;
            }
        }

        core.metrics.record_log(level);
        core.hooks.fire_all(&entry);

        let started = Instant::now();
        let result = core.writer.write(entry);
        core.metrics.record_latency(started.elapsed());

        match result {
            Ok(()) => {}
            // Pipeline shut down underneath a live facade
            Err(LoggerError::WriterClosed) => core.metrics.record_dropped(),
            Err(e) => {
                core.metrics.record_error();
                let errors = core.metrics.error_count();
                if should_report(errors) {
                    eprintln!("[LOGGER ERROR] Write failed ({} errors so far): {}", errors, e);
                }
            }
        }
    }

    #[inline]
    #[track_caller]
    pub fn debug(&self, message: impl AsRef<str>) {
        self.dispatch(LogLevel::Debug, message.as_ref(), None);
    }

    #[inline]
    #[track_caller]
    pub fn info(&self, message: impl AsRef<str>) {
        self.dispatch(LogLevel::Info, message.as_ref(), None);
    }

    #[inline]
    #[track_caller]
    pub fn warn(&self, message: impl AsRef<str>) {
        self.dispatch(LogLevel::Warn, message.as_ref(), None);
    }

    #[inline]
    #[track_caller]
    pub fn error(&self, message: impl AsRef<str>) {
        self.dispatch(LogLevel::Error, message.as_ref(), None);
    }

    /// Log at `Fatal`; the process keeps running
    #[inline]
    #[track_caller]
    pub fn fatal(&self, message: impl AsRef<str>) {
        self.dispatch(LogLevel::Fatal, message.as_ref(), None);
    }

    #[track_caller]
    pub fn debug_with_fields(&self, message: impl AsRef<str>, fields: Fields) {
        self.dispatch(LogLevel::Debug, message.as_ref(), Some(&fields));
    }

    #[track_caller]
    pub fn info_with_fields(&self, message: impl AsRef<str>, fields: Fields) {
        self.dispatch(LogLevel::Info, message.as_ref(), Some(&fields));
    }

    #[track_caller]
    pub fn warn_with_fields(&self, message: impl AsRef<str>, fields: Fields) {
        self.dispatch(LogLevel::Warn, message.as_ref(), Some(&fields));
    }

    #[track_caller]
    pub fn error_with_fields(&self, message: impl AsRef<str>, fields: Fields) {
        self.dispatch(LogLevel::Error, message.as_ref(), Some(&fields));
    }

    #[track_caller]
    pub fn fatal_with_fields(&self, message: impl AsRef<str>, fields: Fields) {
        self.dispatch(LogLevel::Fatal, message.as_ref(), Some(&fields));
    }

    /// Derive a logger carrying one more base field
    ///
    /// The parent is untouched; the child starts at the parent's level.
    ///
    /// # Example
    ///
    /// ```
    /// use rust_structured_logger::prelude::*;
    ///
    /// let sink = MemorySink::new();
    /// let handle = sink.handle();
    /// let logger = Logger::new(sink);
    ///
    /// let request = logger.with_field("request_id", "r-42");
    /// request.info("handled");
    /// logger.info("idle");
    ///
    /// let entries = handle.entries();
    /// assert!(entries[0].fields.contains_key("request_id"));
    /// assert!(entries[1].fields.is_empty());
    /// ```
    #[must_use]
    pub fn with_field(&self, key: impl Into<String>, value: impl Into<FieldValue>) -> Logger {
        let mut fields = (*self.fields).clone();
        fields.insert(key, value);
        self.derive(fields)
    }

    /// Derive a logger with `fields` added to the base set (new values win)
    #[must_use]
    pub fn with_fields(&self, fields: &Fields) -> Logger {
        let mut merged = (*self.fields).clone();
        merged.merge_from(fields);
        self.derive(merged)
    }

    /// Derive a logger with an `error` field holding the error's message
    #[must_use]
    pub fn with_error(&self, error: &dyn std::error::Error) -> Logger {
        self.with_field("error", error.to_string())
    }

    fn derive(&self, fields: Fields) -> Logger {
        Logger {
            core: Arc::clone(&self.core),
            level: Arc::new(AtomicU8::new(self.level.load(Ordering::Relaxed))),
            fields: Arc::new(fields),
        }
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Push everything accepted so far through to the sink
    pub fn sync(&self) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        self.core.writer.flush()
    }

    /// Flush and close the pipeline
    ///
    /// Shared by every handle. Only the first call does anything; afterwards
    /// log calls are dropped and counted.
    pub fn close(&self) -> Result<()> {
        if self.core.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.core.writer.close()
    }

    pub fn is_closed(&self) -> bool {
        self.core.closed.load(Ordering::Acquire)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.core.metrics.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.core.metrics.reset();
    }

    /// Hook invocations that failed or panicked
    pub fn hook_failures(&self) -> u64 {
        self.core.hooks.failures()
    }

    pub fn entry_pool(&self) -> &Arc<EntryPool> {
        &self.core.pool
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("level", &self.level())
            .field("fields", &self.fields.len())
            .field("hooks", &self.core.hooks)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::filter::{FieldFilter, LevelFilter};
    use crate::core::hooks::FnHook;
    use crate::core::sampling::RateSampler;
    use crate::core::LoggerError;
    use crate::sinks::{MemorySink, MemorySinkHandle};
    use std::sync::atomic::AtomicUsize;

    fn memory_logger() -> (Logger, MemorySinkHandle) {
        let sink = MemorySink::new();
        let handle = sink.handle();
        (Logger::new(sink), handle)
    }

    #[test]
    fn test_level_gate_writes_nothing() {
        let (logger, handle) = memory_logger();
        logger.set_level(LogLevel::Error);

        logger.debug("d");
        logger.info("i");
        logger.warn("w");

        assert!(handle.is_empty());
        assert_eq!(handle.append_calls(), 0);
        assert_eq!(logger.metrics().total_logs, 0);
        // Gated calls never touch the pool
        assert_eq!(logger.entry_pool().metrics().misses, 0);
    }

    #[test]
    fn test_levels_reach_sink() {
        let (logger, handle) = memory_logger();
        logger.set_level(LogLevel::Debug);
        logger.debug("d");
        logger.info("i");
        logger.warn("w");
        logger.error("e");
        logger.fatal("f");

        let levels: Vec<_> = handle.entries().iter().map(|e| e.level).collect();
        assert_eq!(levels, LogLevel::ALL.to_vec());
        assert!(!logger.is_closed());
    }

    #[test]
    fn test_with_field_isolation() {
        let (parent, handle) = memory_logger();
        let child = parent.with_field("k", "v");

        parent.info("parent");
        child.info("child");

        let entries = handle.entries();
        assert!(!entries[0].fields.contains_key("k"));
        assert_eq!(entries[1].fields.get("k"), Some(&FieldValue::from("v")));
        assert!(parent.fields().is_empty());
    }

    #[test]
    fn test_call_fields_override_base() {
        let (logger, handle) = memory_logger();
        let logger = logger.with_field("user", "base").with_field("region", "eu");
        logger.info_with_fields("override", Fields::new().with_field("user", "call"));

        let entry = &handle.entries()[0];
        assert_eq!(entry.fields.get("user"), Some(&FieldValue::from("call")));
        assert_eq!(entry.fields.get("region"), Some(&FieldValue::from("eu")));
    }

    #[test]
    fn test_derived_level_is_independent() {
        let (parent, handle) = memory_logger();
        let child = parent.with_field("c", 1);
        child.set_level(LogLevel::Error);

        parent.info("parent info");
        child.info("child info");
        assert_eq!(handle.messages(), vec!["parent info"]);
        assert_eq!(parent.level(), LogLevel::Info);
    }

    #[test]
    fn test_write_to_closed_pipeline_counts_as_dropped() {
        let sink = MemorySink::new();
        let handle = sink.handle();
        let writer = DirectWriter::new(sink);
        writer.close().unwrap();

        let logger = Logger::from_parts(
            LoggerCore {
                writer: Arc::new(writer),
                hooks: HookSet::new(),
                filter: None,
                sampler: None,
                metrics: Arc::new(MetricsCollector::new()),
                pool: Arc::new(EntryPool::default()),
                caller: false,
                closed: AtomicBool::new(false),
            },
            LogLevel::Info,
            Fields::new(),
        );
        logger.info("late");

        let metrics = logger.metrics();
        assert_eq!(metrics.total_logs, 1);
        assert_eq!(metrics.dropped_logs, 1);
        assert_eq!(metrics.error_count, 0);
        assert!(handle.is_empty());
    }

    #[test]
    fn test_write_latency_is_recorded() {
        let (logger, _handle) = memory_logger();
        logger.info("a");
        logger.warn("b");

        let latency = logger.metrics().latency;
        assert_eq!(latency.count, 2);
        assert!(latency.min <= latency.p50 && latency.p50 <= latency.max);
    }

    #[test]
    fn test_with_error() {
        let (logger, handle) = memory_logger();
        let err = LoggerError::other("connection reset");
        logger.with_error(&err).error("request failed");

        let entry = &handle.entries()[0];
        assert_eq!(
            entry.fields.get("error"),
            Some(&FieldValue::from("connection reset"))
        );
    }

    #[test]
    fn test_caller_points_at_call_site() {
        let (logger, handle) = memory_logger();
        let line = line!() + 1;
        logger.info("here");

        let caller = handle.entries()[0].caller.clone().expect("caller captured");
        assert_eq!(caller, format!("logger.rs:{}", line));
    }

    #[test]
    fn test_close_is_idempotent_and_drops_later_logs() {
        let (logger, handle) = memory_logger();
        logger.info("before");
        logger.close().unwrap();
        logger.close().unwrap();

        logger.info("after");
        assert_eq!(handle.messages(), vec!["before"]);
        assert_eq!(handle.close_count(), 1);
        assert_eq!(logger.metrics().dropped_logs, 1);
        assert!(logger.sync().is_ok());
    }

    #[test]
    fn test_write_errors_counted_not_returned() {
        let (logger, handle) = memory_logger();
        handle.fail_next(1);
        logger.info("fails");
        logger.info("works");

        assert_eq!(logger.metrics().error_count, 1);
        assert_eq!(handle.messages(), vec!["works"]);
    }

    #[test]
    fn test_filter_and_sampler_rejections_counted() {
        let sink = MemorySink::new();
        let handle = sink.handle();
        let logger = Logger::builder()
            .sink(sink)
            .filter(FieldFilter::equals("keep", true))
            .sampler(RateSampler::new(1.0))
            .build()
            .unwrap();

        logger.info("no field");
        logger.info_with_fields("kept", Fields::new().with_field("keep", true));

        assert_eq!(handle.messages(), vec!["kept"]);
        let metrics = logger.metrics();
        assert_eq!(metrics.filtered_logs, 1);
        assert_eq!(metrics.total_logs, 1);

        let sampled = Logger::builder()
            .sink(MemorySink::new())
            .filter(LevelFilter::new(LogLevel::Debug))
            .sampler(RateSampler::new(0.0))
            .build()
            .unwrap();
        sampled.info("never");
        assert_eq!(sampled.metrics().sampled_out, 1);
        assert_eq!(sampled.entry_pool().idle(), 1);
    }

    #[test]
    fn test_hooks_fire_before_write() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let logger = Logger::builder()
            .sink(MemorySink::new())
            .hook(
                FnHook::new(move |_: &LogEntry| {
                    counter.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                })
                .for_levels(&[LogLevel::Error]),
            )
            .build()
            .unwrap();

        logger.info("quiet");
        logger.error("loud");
        assert_eq!(fired.load(Ordering::Relaxed), 1);
        assert_eq!(logger.hook_failures(), 0);
    }
}
