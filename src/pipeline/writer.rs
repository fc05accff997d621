//! The writer seam between the facade and everything behind it

use crate::core::error::{LoggerError, Result};
use crate::core::log_entry::LogEntry;
use crate::core::pool::EntryPool;
use crate::core::sink::Sink;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A pipeline stage that takes ownership of finalized entries
///
/// The direct writer, the batcher and the dispatcher all implement this, so
/// any of them can sit behind a [`Logger`](crate::core::Logger) or in front
/// of another stage.
pub trait LogWriter: Send + Sync {
    fn write(&self, entry: LogEntry) -> Result<()>;

    /// Write every entry in order, returning the first failure
    ///
    /// A failing entry never keeps the rest of the batch from being offered.
    fn write_batch(&self, entries: Vec<LogEntry>) -> Result<()> {
        let mut first_error = None;
        for entry in entries {
            if let Err(e) = self.write(entry) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn flush(&self) -> Result<()>;

    /// Flush and release the destination; later calls are no-ops
    fn close(&self) -> Result<()>;

    fn is_closed(&self) -> bool;
}

impl<W: LogWriter + ?Sized> LogWriter for Arc<W> {
    fn write(&self, entry: LogEntry) -> Result<()> {
        (**self).write(entry)
    }

    fn write_batch(&self, entries: Vec<LogEntry>) -> Result<()> {
        (**self).write_batch(entries)
    }

    fn flush(&self) -> Result<()> {
        (**self).flush()
    }

    fn close(&self) -> Result<()> {
        (**self).close()
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }
}

/// Synchronous writer appending straight to a sink
pub struct DirectWriter {
    sink: Mutex<Box<dyn Sink>>,
    pool: Option<Arc<EntryPool>>,
    closed: AtomicBool,
}

impl DirectWriter {
    pub fn new<S: Sink + 'static>(sink: S) -> Self {
        Self::from_boxed(Box::new(sink))
    }

    pub fn from_boxed(sink: Box<dyn Sink>) -> Self {
        Self {
            sink: Mutex::new(sink),
            pool: None,
            closed: AtomicBool::new(false),
        }
    }

    /// Return consumed entries to `pool`
    #[must_use]
    pub fn with_entry_pool(mut self, pool: Arc<EntryPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    fn release(&self, entry: LogEntry) {
        if let Some(pool) = &self.pool {
            pool.put(entry);
        }
    }
}

impl LogWriter for DirectWriter {
    fn write(&self, entry: LogEntry) -> Result<()> {
        if self.is_closed() {
            self.release(entry);
            return Err(LoggerError::WriterClosed);
        }
        let result = self.sink.lock().append(&entry);
        self.release(entry);
        result
    }

    fn write_batch(&self, entries: Vec<LogEntry>) -> Result<()> {
        if self.is_closed() {
            entries.into_iter().for_each(|e| self.release(e));
            return Err(LoggerError::WriterClosed);
        }

        let mut first_error = None;
        let mut sink = self.sink.lock();
        for entry in entries {
            if let Err(e) = sink.append(&entry) {
                first_error.get_or_insert(e);
            }
            self.release(entry);
        }
        first_error.map_or(Ok(()), Err)
    }

    fn flush(&self) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        self.sink.lock().flush()
    }

    fn close(&self) -> Result<()> {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }
        let mut sink = self.sink.lock();
        let flushed = sink.flush();
        let closed = sink.close();
        flushed.and(closed)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for DirectWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectWriter")
            .field("closed", &self.is_closed())
            .finish()
    }
}
