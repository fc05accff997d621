//! Core logger types and traits

pub mod config;
pub(crate) mod diagnostics;
pub mod error;
pub mod fields;
pub mod filter;
pub mod formatter;
pub mod hooks;
pub mod log_entry;
pub mod log_level;
pub mod logger;
pub mod metrics;
pub mod overflow_policy;
pub mod pool;
pub mod sampling;
pub mod sink;
pub mod timestamp;

pub use config::{FilteringSection, LoggerBuilder, LoggerConfig, SamplingKind, SamplingSection};
pub use error::{LoggerError, Result};
pub use fields::{FieldValue, Fields};
pub use filter::{CompositeFilter, CompositeMode, FieldFilter, FieldOp, Filter, LevelFilter};
pub use formatter::{Formatter, LineFormatter, OutputFormat};
pub use hooks::{FnHook, Hook, HookSet};
pub use log_entry::LogEntry;
pub use log_level::LogLevel;
pub use logger::Logger;
pub use metrics::{LatencySnapshot, MetricsCollector, MetricsSnapshot};
pub use overflow_policy::{OverflowCallback, OverflowPolicy};
pub use pool::{BufferPool, EntryPool, Pool, PoolMetricsSnapshot, Reset};
pub use sampling::{
    AdaptiveSampler, LevelSampler, RateSampler, Sampler, SamplerMetrics, SamplingConfig,
};
pub use sink::Sink;
pub use timestamp::TimestampFormat;
