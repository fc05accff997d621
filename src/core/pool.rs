//! Object recycling for entries and byte buffers
//!
//! Bounds allocator pressure under sustained throughput by handing out
//! previously used objects instead of allocating fresh ones.
//!
//! - **get**: pops an idle object (reset) or allocates one through the factory
//! - **put**: resets the object and keeps it if the idle list has room,
//!   otherwise drops it
//!
//! `put` takes the object by value, so nothing can read or write it after it
//! went back to the pool.
//!
//! # Example
//!
//! ```
//! use rust_structured_logger::core::pool::BufferPool;
//!
//! let pool = BufferPool::for_buffers(16, 1024);
//! let mut buf = pool.get();
//! buf.extend_from_slice(b"hello");
//! pool.put(buf);
//!
//! // Returned buffers come back empty
//! assert!(pool.get().is_empty());
//! ```

use super::log_entry::LogEntry;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Objects that can be cleared for reuse
pub trait Reset {
    /// Drop all per-use state, keeping allocations where possible
    fn reset(&mut self);
}

impl Reset for Vec<u8> {
    fn reset(&mut self) {
        self.clear();
    }
}

/// Pool counters
#[derive(Debug, Default)]
pub struct PoolMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    returns: AtomicU64,
    discards: AtomicU64,
}

/// Point-in-time copy of [`PoolMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolMetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub returns: u64,
    pub discards: u64,
}

impl PoolMetrics {
    pub fn snapshot(&self) -> PoolMetricsSnapshot {
        PoolMetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            returns: self.returns.load(Ordering::Relaxed),
            discards: self.discards.load(Ordering::Relaxed),
        }
    }
}

impl PoolMetricsSnapshot {
    /// Fraction of `get` calls served from the idle list (1.0 when unused)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            1.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

type Factory<T> = Box<dyn Fn() -> T + Send + Sync>;

/// Bounded pool of reusable objects
pub struct Pool<T: Reset> {
    idle: Mutex<Vec<T>>,
    max_idle: usize,
    factory: Factory<T>,
    metrics: PoolMetrics,
}

impl<T: Reset> Pool<T> {
    /// Create a pool keeping at most `max_idle` objects between uses
    pub fn new<F>(max_idle: usize, factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            idle: Mutex::new(Vec::with_capacity(max_idle)),
            max_idle,
            factory: Box::new(factory),
            metrics: PoolMetrics::default(),
        }
    }

    /// Take an object in its reset state
    pub fn get(&self) -> T {
        let pooled = self.idle.lock().pop();
        match pooled {
            Some(mut obj) => {
                self.metrics.hits.fetch_add(1, Ordering::Relaxed);
                obj.reset();
                obj
            }
            None => {
                self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                let mut obj = (self.factory)();
                obj.reset();
                obj
            }
        }
    }

    /// Give an object back; it is cleared before it becomes visible to others
    pub fn put(&self, mut obj: T) {
        obj.reset();
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(obj);
            drop(idle);
            self.metrics.returns.fetch_add(1, Ordering::Relaxed);
        } else {
            drop(idle);
            self.metrics.discards.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Number of objects waiting for reuse
    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }

    pub fn max_idle(&self) -> usize {
        self.max_idle
    }

    pub fn metrics(&self) -> PoolMetricsSnapshot {
        self.metrics.snapshot()
    }
}

impl<T: Reset> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("idle", &self.idle())
            .field("max_idle", &self.max_idle)
            .field("metrics", &self.metrics.snapshot())
            .finish()
    }
}

/// Pool of log entries
pub type EntryPool = Pool<LogEntry>;

/// Pool of byte buffers used while formatting
pub type BufferPool = Pool<Vec<u8>>;

/// Default number of idle entries kept by an [`EntryPool`]
pub const DEFAULT_ENTRY_POOL_SIZE: usize = 1024;

impl Pool<LogEntry> {
    pub fn for_entries(max_idle: usize) -> Self {
        Pool::new(max_idle, LogEntry::empty)
    }
}

impl Default for Pool<LogEntry> {
    fn default() -> Self {
        Self::for_entries(DEFAULT_ENTRY_POOL_SIZE)
    }
}

impl Pool<Vec<u8>> {
    pub fn for_buffers(max_idle: usize, buffer_capacity: usize) -> Self {
        Pool::new(max_idle, move || Vec::with_capacity(buffer_capacity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::LogLevel;

    #[test]
    fn test_get_allocates_when_empty() {
        let pool = EntryPool::for_entries(4);
        let entry = pool.get();
        assert_eq!(entry, LogEntry::empty());
        assert_eq!(pool.metrics().misses, 1);
        assert_eq!(pool.metrics().hits, 0);
    }

    #[test]
    fn test_put_clears_fields() {
        let pool = EntryPool::for_entries(4);
        let entry = LogEntry::new(LogLevel::Error, "boom").with_field("secret", "token");
        pool.put(entry);
        assert_eq!(pool.idle(), 1);

        let reused = pool.get();
        assert!(reused.fields.is_empty());
        assert!(reused.message.is_empty());
        assert_eq!(reused.level, LogLevel::Debug);
        assert_eq!(pool.metrics().hits, 1);
    }

    #[test]
    fn test_put_beyond_capacity_discards() {
        let pool = BufferPool::for_buffers(2, 64);
        pool.put(Vec::new());
        pool.put(Vec::new());
        pool.put(Vec::new());

        assert_eq!(pool.idle(), 2);
        let metrics = pool.metrics();
        assert_eq!(metrics.returns, 2);
        assert_eq!(metrics.discards, 1);
    }

    #[test]
    fn test_buffer_keeps_capacity() {
        let pool = BufferPool::for_buffers(1, 256);
        let mut buf = pool.get();
        assert!(buf.capacity() >= 256);
        buf.extend_from_slice(&[1, 2, 3]);
        pool.put(buf);

        let buf = pool.get();
        assert!(buf.is_empty());
        assert!(buf.capacity() >= 256);
    }

    #[test]
    fn test_hit_rate() {
        let pool = BufferPool::for_buffers(1, 8);
        assert_eq!(pool.metrics().hit_rate(), 1.0);
        let buf = pool.get();
        pool.put(buf);
        let _ = pool.get();
        assert!((pool.metrics().hit_rate() - 0.5).abs() < f64::EPSILON);
    }
}
