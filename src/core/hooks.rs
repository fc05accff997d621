//! Side effects fired for every accepted entry
//!
//! Hooks run synchronously on the logging thread before the entry is handed
//! to the writer. A failing or panicking hook is counted and reported on
//! stderr; the log call itself always proceeds.

use super::diagnostics::{panic_message, should_report};
use super::error::Result;
use super::log_entry::LogEntry;
use super::log_level::LogLevel;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub trait Hook: Send + Sync {
    fn fire(&self, entry: &LogEntry) -> Result<()>;

    /// Levels this hook wants; an empty slice means every level
    fn levels(&self) -> &[LogLevel] {
        &[]
    }
}

/// Adapts a closure into a [`Hook`]
///
/// # Example
///
/// ```
/// use rust_structured_logger::core::{FnHook, Hook, LogEntry, LogLevel};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let alerts = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&alerts);
/// let hook = FnHook::new(move |_entry: &LogEntry| {
///     counter.fetch_add(1, Ordering::Relaxed);
///     Ok(())
/// })
/// .for_levels(&[LogLevel::Error, LogLevel::Fatal]);
///
/// hook.fire(&LogEntry::new(LogLevel::Error, "boom")).unwrap();
/// assert_eq!(alerts.load(Ordering::Relaxed), 1);
/// ```
pub struct FnHook<F> {
    func: F,
    levels: Vec<LogLevel>,
}

impl<F> FnHook<F>
where
    F: Fn(&LogEntry) -> Result<()> + Send + Sync,
{
    pub fn new(func: F) -> Self {
        Self {
            func,
            levels: Vec::new(),
        }
    }

    #[must_use]
    pub fn for_levels(mut self, levels: &[LogLevel]) -> Self {
        self.levels = levels.to_vec();
        self
    }
}

impl<F> Hook for FnHook<F>
where
    F: Fn(&LogEntry) -> Result<()> + Send + Sync,
{
    fn fire(&self, entry: &LogEntry) -> Result<()> {
        (self.func)(entry)
    }

    fn levels(&self) -> &[LogLevel] {
        &self.levels
    }
}

/// Ordered hook registry with failure isolation
#[derive(Default)]
pub struct HookSet {
    hooks: Vec<Arc<dyn Hook>>,
    failures: AtomicU64,
}

impl HookSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, hook: Arc<dyn Hook>) {
        self.hooks.push(hook);
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Number of hook invocations that returned an error or panicked
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Fire every hook registered for the entry's level, in registration order
    pub fn fire_all(&self, entry: &LogEntry) {
        for (idx, hook) in self.hooks.iter().enumerate() {
            let levels = hook.levels();
            if !levels.is_empty() && !levels.contains(&entry.level) {
                continue;
            }

            match catch_unwind(AssertUnwindSafe(|| hook.fire(entry))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if should_report(self.record_failure()) {
                        eprintln!("[LOGGER ERROR] Hook #{} failed: {}", idx, e);
                    }
                }
                Err(payload) => {
                    if should_report(self.record_failure()) {
                        eprintln!(
                            "[LOGGER CRITICAL] Hook #{} panicked: {}. \
                             Remaining hooks still run.",
                            idx,
                            panic_message(payload.as_ref())
                        );
                    }
                }
            }
        }
    }

    fn record_failure(&self) -> u64 {
        self.failures.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl fmt::Debug for HookSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookSet")
            .field("hooks", &self.hooks.len())
            .field("failures", &self.failures())
            .finish()
    }
}
