//! Logger configuration and the builder that assembles a pipeline

use super::error::{LoggerError, Result};
use super::fields::{FieldValue, Fields};
use super::filter::{CompositeFilter, FieldFilter, Filter, LevelFilter};
use super::formatter::{Formatter, LineFormatter, OutputFormat};
use super::hooks::{Hook, HookSet};
use super::log_level::LogLevel;
use super::logger::{Logger, LoggerCore};
use super::metrics::MetricsCollector;
use super::overflow_policy::{OverflowCallback, OverflowPolicy};
use super::pool::EntryPool;
use super::sampling::{LevelSampler, RateSampler, Sampler};
use super::sink::Sink;
use crate::pipeline::batcher::{Batcher, BatcherConfig};
use crate::pipeline::dispatcher::{default_workers, Attachments, Dispatcher, DispatcherConfig};
use crate::pipeline::writer::{DirectWriter, LogWriter};
use crate::sinks::WriterSink;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

/// How a configured sampler picks entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingKind {
    Rate,
    Level,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingSection {
    #[serde(rename = "type")]
    pub kind: SamplingKind,
    #[serde(default = "default_rate")]
    pub rate: f64,
    #[serde(default)]
    pub levels: HashMap<LogLevel, f64>,
}

fn default_rate() -> f64 {
    1.0
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilteringSection {
    #[serde(default)]
    pub min_level: Option<LogLevel>,
    /// Fields that must equal the given string values
    #[serde(default)]
    pub fields: HashMap<String, String>,
}

/// Declarative logger settings
///
/// Durations are plain milliseconds so the struct maps directly onto JSON.
///
/// # Example
///
/// ```
/// use rust_structured_logger::core::{LogLevel, LoggerConfig};
///
/// let config = LoggerConfig::from_json(r#"{
///     "level": "Warn",
///     "async_mode": true,
///     "queue_capacity": 512,
///     "fields": { "service": "billing" }
/// }"#).unwrap();
///
/// assert_eq!(config.level, LogLevel::Warn);
/// assert_eq!(config.queue_capacity, 512);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub level: LogLevel,
    /// Put a dispatcher in front of the sink
    pub async_mode: bool,
    pub queue_capacity: usize,
    /// Dispatcher workers; 0 picks the available parallelism
    pub workers: usize,
    /// Put a batcher in front of the sink
    pub batching: bool,
    pub batch_size: usize,
    pub flush_interval_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    /// `true` drops (and alerts) on a full queue, `false` blocks the caller
    pub drop_on_full: bool,
    /// Record the `file:line` of each call
    pub caller: bool,
    /// Output format for byte-oriented sinks
    pub format: OutputFormat,
    pub fields: Fields,
    pub sampling: Option<SamplingSection>,
    pub filtering: Option<FilteringSection>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            async_mode: false,
            queue_capacity: crate::pipeline::dispatcher::DEFAULT_QUEUE_CAPACITY,
            workers: 0,
            batching: false,
            batch_size: crate::pipeline::batcher::DEFAULT_BATCH_SIZE,
            flush_interval_ms: 100,
            max_retries: crate::pipeline::batcher::DEFAULT_MAX_RETRIES,
            retry_delay_ms: 10,
            drop_on_full: true,
            caller: true,
            format: OutputFormat::Text,
            fields: Fields::new(),
            sampling: None,
            filtering: None,
        }
    }
}

impl LoggerConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.async_mode {
            self.dispatcher_config().validate()?;
        }
        if self.batching {
            self.batcher_config().validate()?;
        }
        if let Some(sampling) = &self.sampling {
            let rates = std::iter::once(sampling.rate).chain(sampling.levels.values().copied());
            for rate in rates {
                if !(0.0..=1.0).contains(&rate) {
                    return Err(LoggerError::config(
                        "sampling",
                        format!("rate {} is outside [0.0, 1.0]", rate),
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            queue_capacity: self.queue_capacity,
            workers: if self.workers == 0 {
                default_workers()
            } else {
                self.workers
            },
            flush_interval: Duration::from_millis(self.flush_interval_ms),
            overflow_policy: OverflowPolicy::from_drop_on_full(self.drop_on_full),
            ..Default::default()
        }
    }

    pub fn batcher_config(&self) -> BatcherConfig {
        BatcherConfig {
            batch_size: self.batch_size,
            flush_interval: Duration::from_millis(self.flush_interval_ms),
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    fn sampler(&self) -> Option<Arc<dyn Sampler>> {
        let sampling = self.sampling.as_ref()?;
        let sampler: Arc<dyn Sampler> = match sampling.kind {
            SamplingKind::Rate => Arc::new(RateSampler::new(sampling.rate)),
            SamplingKind::Level => Arc::new(
                sampling
                    .levels
                    .iter()
                    .fold(LevelSampler::new(), |s, (level, rate)| s.with_rate(*level, *rate)),
            ),
        };
        Some(sampler)
    }

    fn filter(&self) -> Option<Arc<dyn Filter>> {
        let filtering = self.filtering.as_ref()?;
        let mut composite = CompositeFilter::all();
        if let Some(min_level) = filtering.min_level {
            composite = composite.with(LevelFilter::new(min_level));
        }
        for (field, value) in &filtering.fields {
            composite = composite.with(FieldFilter::equals(field.clone(), value.as_str()));
        }
        Some(Arc::new(composite))
    }
}

/// Builder for constructing a [`Logger`] with a fluent API
///
/// Stages are stacked as sink, then batcher (optional), then dispatcher
/// (optional), with the facade in front.
///
/// # Example
///
/// ```
/// use rust_structured_logger::prelude::*;
/// use std::sync::Arc;
///
/// let sink = MemorySink::new();
/// let handle = sink.handle();
///
/// let logger = Logger::builder()
///     .level(LogLevel::Debug)
///     .sink(sink)
///     .field("service", "checkout")
///     .async_mode(1000)
///     .overflow_policy(OverflowPolicy::AlertAndDrop)
///     .on_overflow(Arc::new(|count| {
///         eprintln!("ALERT: {} logs dropped", count);
///     }))
///     .build()
///     .unwrap();
///
/// logger.debug("cart loaded");
/// logger.close().unwrap();
/// assert_eq!(handle.len(), 1);
/// ```
pub struct LoggerBuilder {
    level: LogLevel,
    sink: Option<Box<dyn Sink>>,
    writer: Option<Box<dyn Write + Send>>,
    formatter: Option<Box<dyn Formatter>>,
    format: OutputFormat,
    hooks: HookSet,
    fields: Fields,
    caller: bool,
    filter: Option<Arc<dyn Filter>>,
    sampler: Option<Arc<dyn Sampler>>,
    batching: Option<BatcherConfig>,
    dispatcher: Option<DispatcherConfig>,
    overflow_policy: Option<OverflowPolicy>,
    on_overflow: Option<OverflowCallback>,
    entry_pool: Option<Arc<EntryPool>>,
}

impl LoggerBuilder {
    pub fn new() -> Self {
        Self {
            level: LogLevel::Info,
            sink: None,
            writer: None,
            formatter: None,
            format: OutputFormat::Text,
            hooks: HookSet::new(),
            fields: Fields::new(),
            caller: true,
            filter: None,
            sampler: None,
            batching: None,
            dispatcher: None,
            overflow_policy: None,
            on_overflow: None,
            entry_pool: None,
        }
    }

    /// Start from a [`LoggerConfig`]; the sink still has to be supplied
    pub fn from_config(config: &LoggerConfig) -> Self {
        let mut builder = Self::new()
            .level(config.level)
            .caller(config.caller)
            .format(config.format)
            .fields(&config.fields);
        builder.filter = config.filter();
        builder.sampler = config.sampler();
        if config.batching {
            builder.batching = Some(config.batcher_config());
        }
        if config.async_mode {
            builder.dispatcher = Some(config.dispatcher_config());
        }
        builder
    }

    #[must_use = "builder methods return a new value"]
    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Set the destination
    #[must_use = "builder methods return a new value"]
    pub fn sink<S: Sink + 'static>(mut self, sink: S) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Write formatted lines to `writer` instead of an explicit sink
    #[must_use = "builder methods return a new value"]
    pub fn writer<W: Write + Send + 'static>(mut self, writer: W) -> Self {
        self.writer = Some(Box::new(writer));
        self
    }

    /// Formatter used with [`LoggerBuilder::writer`]
    #[must_use = "builder methods return a new value"]
    pub fn formatter<F: Formatter + 'static>(mut self, formatter: F) -> Self {
        self.formatter = Some(Box::new(formatter));
        self
    }

    /// Built-in format used with [`LoggerBuilder::writer`] when no formatter is set
    #[must_use = "builder methods return a new value"]
    pub fn format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn hook<H: Hook + 'static>(mut self, hook: H) -> Self {
        self.hooks.add(Arc::new(hook));
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key, value);
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn fields(mut self, fields: &Fields) -> Self {
        self.fields.merge_from(fields);
        self
    }

    /// Enable or disable call-site capture (enabled by default)
    #[must_use = "builder methods return a new value"]
    pub fn caller(mut self, enabled: bool) -> Self {
        self.caller = enabled;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn filter<F: Filter + 'static>(mut self, filter: F) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn sampler<S: Sampler + 'static>(mut self, sampler: S) -> Self {
        self.sampler = Some(Arc::new(sampler));
        self
    }

    /// Batch writes to the sink
    #[must_use = "builder methods return a new value"]
    pub fn batching(mut self, config: BatcherConfig) -> Self {
        self.batching = Some(config);
        self
    }

    /// Dispatch asynchronously with the given configuration
    #[must_use = "builder methods return a new value"]
    pub fn dispatcher(mut self, config: DispatcherConfig) -> Self {
        self.dispatcher = Some(config);
        self
    }

    /// Dispatch asynchronously through a queue of `queue_capacity` entries
    ///
    /// If not called, the logger writes synchronously.
    #[must_use = "builder methods return a new value"]
    pub fn async_mode(mut self, queue_capacity: usize) -> Self {
        let mut config = self.dispatcher.take().unwrap_or_default();
        config.queue_capacity = queue_capacity;
        self.dispatcher = Some(config);
        self
    }

    /// Overflow policy for the dispatcher queue; default is `AlertAndDrop`
    #[must_use = "builder methods return a new value"]
    pub fn overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = Some(policy);
        self
    }

    /// Called with the total drop count on each alerting overflow
    #[must_use = "builder methods return a new value"]
    pub fn on_overflow(mut self, callback: OverflowCallback) -> Self {
        self.on_overflow = Some(callback);
        self
    }

    /// Share an entry pool across loggers
    #[must_use = "builder methods return a new value"]
    pub fn entry_pool(mut self, pool: Arc<EntryPool>) -> Self {
        self.entry_pool = Some(pool);
        self
    }

    fn take_sink(&mut self) -> Result<Box<dyn Sink>> {
        if let Some(sink) = self.sink.take() {
            return Ok(sink);
        }
        let writer = self
            .writer
            .take()
            .ok_or_else(|| LoggerError::MissingSink("logger".to_string()))?;
        let formatter = self
            .formatter
            .take()
            .unwrap_or_else(|| Box::new(LineFormatter::new(self.format)));
        Ok(Box::new(WriterSink::with_boxed_formatter(writer, formatter)))
    }

    /// Assemble the pipeline
    ///
    /// Fails with a configuration error when no sink or writer was given or a
    /// stage configuration is invalid.
    pub fn build(mut self) -> Result<Logger> {
        let sink = self.take_sink()?;
        let pool = self
            .entry_pool
            .take()
            .unwrap_or_else(|| Arc::new(EntryPool::default()));
        let metrics = Arc::new(MetricsCollector::new());

        let mut writer: Arc<dyn LogWriter> = match self.batching {
            Some(config) => Arc::new(Batcher::build(sink, config, Some(Arc::clone(&pool)))?),
            None => Arc::new(DirectWriter::from_boxed(sink).with_entry_pool(Arc::clone(&pool))),
        };

        if let Some(mut config) = self.dispatcher {
            if let Some(policy) = self.overflow_policy {
                config.overflow_policy = policy;
            }
            let attachments = Attachments {
                pool: Some(Arc::clone(&pool)),
                on_overflow: self.on_overflow,
                collector: Some(Arc::clone(&metrics)),
            };
            writer = Arc::new(Dispatcher::build(writer, config, attachments)?);
        }

        let core = LoggerCore {
            writer,
            hooks: self.hooks,
            filter: self.filter,
            sampler: self.sampler,
            metrics,
            pool,
            caller: self.caller,
            closed: AtomicBool::new(false),
        };
        Ok(Logger::from_parts(core, self.level, self.fields))
    }
}

impl Default for LoggerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger {
    /// Create a builder for Logger
    #[must_use]
    pub fn builder() -> LoggerBuilder {
        LoggerBuilder::new()
    }

    /// Build a logger from configuration and a sink
    pub fn from_config<S: Sink + 'static>(config: &LoggerConfig, sink: S) -> Result<Logger> {
        config.validate()?;
        LoggerBuilder::from_config(config).sink(sink).build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::MemorySink;
    use std::sync::Mutex as StdMutex;

    #[test]
    fn test_missing_sink_is_configuration_error() {
        let err = Logger::builder().build().unwrap_err();
        assert!(matches!(err, LoggerError::MissingSink(_)));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_invalid_stage_config_fails_build() {
        let result = Logger::builder()
            .sink(MemorySink::new())
            .batching(BatcherConfig {
                max_retries: 0,
                ..Default::default()
            })
            .build();
        assert!(result.unwrap_err().is_configuration());
    }

    #[test]
    fn test_config_defaults_round_trip() {
        let config = LoggerConfig::default();
        assert!(config.validate().is_ok());
        let json = config.to_json_pretty().unwrap();
        assert_eq!(LoggerConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_config_validation_rejects_bad_values() {
        let config = LoggerConfig {
            async_mode: true,
            queue_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().is_configuration());

        let config = LoggerConfig {
            sampling: Some(SamplingSection {
                kind: SamplingKind::Rate,
                rate: 1.5,
                levels: HashMap::new(),
            }),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_drop_on_full_maps_to_policy() {
        let config = LoggerConfig {
            drop_on_full: false,
            ..Default::default()
        };
        assert_eq!(config.dispatcher_config().overflow_policy, OverflowPolicy::Block);
        assert_eq!(
            LoggerConfig::default().dispatcher_config().overflow_policy,
            OverflowPolicy::AlertAndDrop
        );
    }

    #[test]
    fn test_from_config_applies_fields_filter_and_sampling() {
        let config = LoggerConfig::from_json(
            r#"{
                "level": "Debug",
                "fields": { "service": "api" },
                "filtering": { "fields": { "tenant": "acme" } },
                "sampling": { "type": "level", "levels": { "Debug": 0.0 } }
            }"#,
        )
        .unwrap();

        let sink = MemorySink::new();
        let handle = sink.handle();
        let logger = Logger::from_config(&config, sink).unwrap();
        let tenant = logger.with_field("tenant", "acme");

        tenant.debug("sampled out");
        tenant.info("kept");
        logger.info("filtered out");

        let entries = handle.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "kept");
        assert_eq!(entries[0].fields.get("service"), Some(&FieldValue::from("api")));
        let metrics = logger.metrics();
        assert_eq!(metrics.sampled_out, 1);
        assert_eq!(metrics.filtered_logs, 1);
    }

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<StdMutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_writer_uses_format() {
        let buf = SharedBuf::default();
        let logger = Logger::builder()
            .writer(buf.clone())
            .format(OutputFormat::Json)
            .caller(false)
            .build()
            .unwrap();

        logger.warn("json line");
        logger.close().unwrap();

        let output = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(output.trim_end()).unwrap();
        assert_eq!(parsed["level"], "WARN");
        assert!(parsed.get("caller").is_none());
    }

    #[test]
    fn test_batching_with_dispatcher_delivers_on_close() {
        let sink = MemorySink::new();
        let handle = sink.handle();
        let logger = Logger::builder()
            .sink(sink)
            .batching(BatcherConfig {
                batch_size: 7,
                ..Default::default()
            })
            .dispatcher(DispatcherConfig {
                workers: 2,
                ..Default::default()
            })
            .build()
            .unwrap();

        for i in 0..100 {
            logger.info(format!("entry {}", i));
        }
        logger.close().unwrap();
        assert_eq!(handle.len(), 100);
        assert_eq!(handle.close_count(), 1);
    }
}
