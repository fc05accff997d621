//! Reference sink implementations

pub mod memory;
pub mod writer;

pub use memory::{MemorySink, MemorySinkHandle};
pub use writer::WriterSink;
