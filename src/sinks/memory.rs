//! In-memory sink for tests and demos

use crate::core::error::{LoggerError, Result};
use crate::core::log_entry::LogEntry;
use crate::core::sink::Sink;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Default)]
struct MemoryState {
    entries: Vec<LogEntry>,
    fail_appends: usize,
    fail_flushes: usize,
    append_calls: u64,
    flush_count: u64,
    close_count: u64,
    delay: Option<Duration>,
}

/// Collects every appended entry
///
/// The sink itself moves into the pipeline; keep a [`MemorySinkHandle`] to
/// inspect what arrived and to inject failures.
///
/// # Example
///
/// ```
/// use rust_structured_logger::core::{LogEntry, LogLevel, Sink};
/// use rust_structured_logger::sinks::MemorySink;
///
/// let mut sink = MemorySink::new();
/// let handle = sink.handle();
///
/// handle.fail_next(1);
/// assert!(sink.append(&LogEntry::new(LogLevel::Info, "lost")).is_err());
/// sink.append(&LogEntry::new(LogLevel::Info, "kept")).unwrap();
///
/// assert_eq!(handle.messages(), vec!["kept"]);
/// ```
#[derive(Debug, Default)]
pub struct MemorySink {
    state: Arc<Mutex<MemoryState>>,
}

/// Shared view of a [`MemorySink`]
#[derive(Debug, Clone)]
pub struct MemorySinkHandle {
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> MemorySinkHandle {
        MemorySinkHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl Sink for MemorySink {
    fn append(&mut self, entry: &LogEntry) -> Result<()> {
        let delay = {
            let mut state = self.state.lock();
            state.append_calls += 1;
            if state.fail_appends > 0 {
                state.fail_appends -= 1;
                return Err(LoggerError::sink("memory", "injected append failure"));
            }
            state.entries.push(entry.clone());
            state.delay
        };
        if let Some(delay) = delay {
            thread::sleep(delay);
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_flushes > 0 {
            state.fail_flushes -= 1;
            return Err(LoggerError::sink("memory", "injected flush failure"));
        }
        state.flush_count += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.state.lock().close_count += 1;
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

impl MemorySinkHandle {
    pub fn entries(&self) -> Vec<LogEntry> {
        self.state.lock().entries.clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.state
            .lock()
            .entries
            .iter()
            .map(|e| e.message.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.state.lock().entries.clear();
    }

    /// Make the next `n` appends fail with a transient sink error
    pub fn fail_next(&self, n: usize) {
        self.state.lock().fail_appends = n;
    }

    /// Make the next `n` flushes fail with a transient sink error
    pub fn fail_next_flushes(&self, n: usize) {
        self.state.lock().fail_flushes = n;
    }

    /// Sleep this long after every successful append
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.state.lock().delay = delay;
    }

    /// Appends attempted, failed ones included
    pub fn append_calls(&self) -> u64 {
        self.state.lock().append_calls
    }

    pub fn flush_count(&self) -> u64 {
        self.state.lock().flush_count
    }

    pub fn close_count(&self) -> u64 {
        self.state.lock().close_count
    }
}
