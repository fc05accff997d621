//! Sampling for high-volume scenarios
//!
//! A sampler decides per entry whether it is kept. Samplers never modify the
//! entry they inspect.
//!
//! - [`RateSampler`]: keep a fixed fraction of entries
//! - [`LevelSampler`]: a different fraction per level
//! - [`AdaptiveSampler`]: bypass levels, per-category rates, and a rate that
//!   shrinks when throughput exceeds a threshold
//!
//! # Example
//!
//! ```
//! use rust_structured_logger::core::{AdaptiveSampler, LogEntry, LogLevel, Sampler, SamplingConfig};
//!
//! let sampler = AdaptiveSampler::new(
//!     SamplingConfig::new(0.0).with_category_rate("audit", 1.0),
//! );
//!
//! // Error and Fatal bypass sampling by default
//! assert!(sampler.should_sample(&LogEntry::new(LogLevel::Error, "disk failed")));
//!
//! let audit = LogEntry::new(LogLevel::Info, "login").with_field("category", "audit");
//! assert!(sampler.should_sample(&audit));
//! assert!(!sampler.should_sample(&LogEntry::new(LogLevel::Info, "noise")));
//! ```

use super::log_entry::LogEntry;
use super::log_level::LogLevel;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Field consulted for per-category rates
pub const CATEGORY_FIELD: &str = "category";

pub trait Sampler: Send + Sync {
    fn should_sample(&self, entry: &LogEntry) -> bool;
}

/// Bernoulli draw with exact boundaries: no randomness at 0.0 or 1.0
#[inline]
fn sample_with_rate(rate: f64) -> bool {
    if rate >= 1.0 {
        true
    } else if rate <= 0.0 {
        false
    } else {
        rand::thread_rng().gen::<f64>() < rate
    }
}

/// Keeps each entry with a fixed probability
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateSampler {
    rate: f64,
}

impl RateSampler {
    /// Rates outside `[0.0, 1.0]` are clamped
    pub fn new(rate: f64) -> Self {
        Self {
            rate: rate.clamp(0.0, 1.0),
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }
}

impl Sampler for RateSampler {
    fn should_sample(&self, _entry: &LogEntry) -> bool {
        sample_with_rate(self.rate)
    }
}

/// Per-level rates; levels without a configured rate are always kept
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LevelSampler {
    rates: HashMap<LogLevel, f64>,
}

impl LevelSampler {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_rate(mut self, level: LogLevel, rate: f64) -> Self {
        self.rates.insert(level, rate.clamp(0.0, 1.0));
        self
    }

    pub fn rate_for(&self, level: LogLevel) -> f64 {
        self.rates.get(&level).copied().unwrap_or(1.0)
    }
}

impl Sampler for LevelSampler {
    fn should_sample(&self, entry: &LogEntry) -> bool {
        sample_with_rate(self.rate_for(entry.level))
    }
}

/// Configuration for [`AdaptiveSampler`]
#[derive(Debug, Clone)]
pub struct SamplingConfig {
    /// Base rate between 0.0 and 1.0
    pub rate: f64,

    /// Levels that bypass sampling entirely
    pub always_sample: Vec<LogLevel>,

    /// Rates keyed by the entry's `category` field; they override the base rate
    pub category_rates: HashMap<String, f64>,

    /// Scale the base rate down when throughput exceeds `adaptive_threshold`
    pub adaptive: bool,

    /// Entries per second above which adaptive scaling starts
    pub adaptive_threshold: usize,

    /// Floor for the adaptively scaled rate
    pub adaptive_min_rate: f64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            rate: 1.0,
            always_sample: vec![LogLevel::Error, LogLevel::Fatal],
            category_rates: HashMap::new(),
            adaptive: false,
            adaptive_threshold: 10000,
            adaptive_min_rate: 0.01,
        }
    }
}

impl SamplingConfig {
    pub fn new(rate: f64) -> Self {
        Self {
            rate: rate.clamp(0.0, 1.0),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_always_sample(mut self, levels: Vec<LogLevel>) -> Self {
        self.always_sample = levels;
        self
    }

    #[must_use]
    pub fn with_category_rate(mut self, category: impl Into<String>, rate: f64) -> Self {
        self.category_rates
            .insert(category.into(), rate.clamp(0.0, 1.0));
        self
    }

    #[must_use]
    pub fn with_adaptive(mut self, threshold: usize, min_rate: f64) -> Self {
        self.adaptive = true;
        self.adaptive_threshold = threshold;
        self.adaptive_min_rate = min_rate.clamp(0.0, 1.0);
        self
    }
}

/// Counters kept by [`AdaptiveSampler`]
#[derive(Debug, Default)]
pub struct SamplerMetrics {
    sampled_count: AtomicU64,
    dropped_count: AtomicU64,
}

impl SamplerMetrics {
    #[inline]
    pub fn sampled_count(&self) -> u64 {
        self.sampled_count.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn dropped_count(&self) -> u64 {
        self.dropped_count.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn total_count(&self) -> u64 {
        self.sampled_count() + self.dropped_count()
    }

    fn record(&self, sampled: bool) {
        if sampled {
            self.sampled_count.fetch_add(1, Ordering::Relaxed);
        } else {
            self.dropped_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Observed fraction of kept entries (1.0 before any decision)
    pub fn effective_sample_rate(&self) -> f64 {
        let total = self.total_count();
        if total == 0 {
            1.0
        } else {
            self.sampled_count() as f64 / total as f64
        }
    }

    pub fn reset(&self) {
        self.sampled_count.store(0, Ordering::Relaxed);
        self.dropped_count.store(0, Ordering::Relaxed);
    }
}

const RATE_WINDOW: Duration = Duration::from_secs(1);

/// Entries per second, measured over tumbling one-second windows
#[derive(Debug)]
struct RateTracker {
    window: Mutex<(Instant, u64)>,
    last_rate: AtomicU64,
}

impl RateTracker {
    fn new() -> Self {
        Self {
            window: Mutex::new((Instant::now(), 0)),
            last_rate: AtomicU64::new(0f64.to_bits()),
        }
    }

    fn record_and_get_rate(&self) -> f64 {
        let mut window = self.window.lock();
        window.1 += 1;

        let elapsed = window.0.elapsed();
        if elapsed.is_zero() {
            return self.current_rate();
        }

        let rate = window.1 as f64 / elapsed.as_secs_f64();
        self.last_rate.store(rate.to_bits(), Ordering::Relaxed);
        if elapsed >= RATE_WINDOW {
            *window = (Instant::now(), 0);
        }
        rate
    }

    fn current_rate(&self) -> f64 {
        f64::from_bits(self.last_rate.load(Ordering::Relaxed))
    }
}

/// Level bypass, category rates and throughput-adaptive base rate
pub struct AdaptiveSampler {
    config: SamplingConfig,
    metrics: SamplerMetrics,
    rate_tracker: RateTracker,
}

impl AdaptiveSampler {
    pub fn new(config: SamplingConfig) -> Self {
        Self {
            config,
            metrics: SamplerMetrics::default(),
            rate_tracker: RateTracker::new(),
        }
    }

    fn effective_rate(&self, entry: &LogEntry) -> f64 {
        let category = entry.fields.get(CATEGORY_FIELD).and_then(|v| v.as_str());
        if let Some(&rate) = category.and_then(|c| self.config.category_rates.get(c)) {
            return rate;
        }

        if self.config.adaptive {
            let current = self.rate_tracker.record_and_get_rate();
            let threshold = self.config.adaptive_threshold as f64;
            if current > threshold {
                let scale = threshold / current;
                return (self.config.rate * scale).max(self.config.adaptive_min_rate);
            }
        }

        self.config.rate
    }

    pub fn metrics(&self) -> &SamplerMetrics {
        &self.metrics
    }

    /// Entries per second seen by the last adaptive measurement
    pub fn current_message_rate(&self) -> f64 {
        self.rate_tracker.current_rate()
    }

    pub fn config(&self) -> &SamplingConfig {
        &self.config
    }
}

impl Sampler for AdaptiveSampler {
    fn should_sample(&self, entry: &LogEntry) -> bool {
        let sampled = self.config.always_sample.contains(&entry.level)
            || sample_with_rate(self.effective_rate(entry));
        self.metrics.record(sampled);
        sampled
    }
}

impl std::fmt::Debug for AdaptiveSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveSampler")
            .field("config", &self.config)
            .field("metrics", &self.metrics)
            .finish()
    }
}
