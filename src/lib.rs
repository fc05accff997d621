//! # Rust Structured Logger
//!
//! A structured logging engine with leveled, field-carrying entries and a
//! configurable delivery pipeline.
//!
//! ## Features
//!
//! - **Structured**: typed key/value fields, inherited by derived loggers
//! - **Pipelined**: optional batching with retry and an asynchronous
//!   dispatcher with a bounded queue and overflow policies
//! - **Selective**: filters, samplers and hooks run before any write
//! - **Observable**: counters for logs, drops, filters and errors
//!
//! ## Example
//!
//! ```
//! use rust_structured_logger::prelude::*;
//!
//! let sink = MemorySink::new();
//! let handle = sink.handle();
//! let logger = Logger::new(sink);
//!
//! let requests = logger.with_field("component", "http");
//! requests.info_with_fields("request served", Fields::new().with_field("status", 200));
//!
//! logger.close().unwrap();
//! assert_eq!(handle.messages(), vec!["request served".to_string()]);
//! ```

pub mod core;
pub mod macros;
pub mod pipeline;
pub mod sinks;

pub mod prelude {
    pub use crate::core::{
        AdaptiveSampler, CompositeFilter, FieldFilter, FieldValue, Fields, Filter, FnHook,
        Formatter, Hook, LevelFilter, LevelSampler, LineFormatter, LogEntry, LogLevel, Logger,
        LoggerBuilder, LoggerConfig, LoggerError, MetricsSnapshot, OutputFormat, OverflowCallback,
        OverflowPolicy, RateSampler, Result, Sampler, SamplingConfig, Sink, TimestampFormat,
    };
    pub use crate::pipeline::{BatcherConfig, DispatcherConfig};
    pub use crate::sinks::{MemorySink, WriterSink};
}

pub use core::{
    FieldValue, Fields, LogEntry, LogLevel, Logger, LoggerBuilder, LoggerConfig, LoggerError,
    OverflowPolicy, Result, Sink,
};
pub use sinks::{MemorySink, WriterSink};
