//! Sink trait for log output destinations

use super::{error::Result, log_entry::LogEntry};

/// Downstream destination for finalized entries.
///
/// A sink is always driven by one stage at a time (the pipeline keeps it
/// behind a mutex), so implementations only need `Send`. It must accept
/// further `append`/`flush` cycles after a flush.
pub trait Sink: Send {
    fn append(&mut self, entry: &LogEntry) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
    fn close(&mut self) -> Result<()>;
    fn name(&self) -> &str;
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn append(&mut self, entry: &LogEntry) -> Result<()> {
        (**self).append(entry)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
