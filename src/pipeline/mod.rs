//! Stages between the facade and the sink

pub mod batcher;
pub mod dispatcher;
pub mod writer;

pub use batcher::{BatchMetricsSnapshot, Batcher, BatcherConfig};
pub use dispatcher::{default_workers, Dispatcher, DispatcherConfig, DispatcherMetricsSnapshot};
pub use writer::{DirectWriter, LogWriter};
