//! Predicates deciding whether an entry continues down the pipeline
//!
//! Filters are pure: they read the entry and never change it.

use super::fields::FieldValue;
use super::log_entry::LogEntry;
use super::log_level::LogLevel;
use std::fmt;
use std::sync::Arc;

pub trait Filter: Send + Sync {
    fn should_log(&self, entry: &LogEntry) -> bool;
}

impl<F> Filter for F
where
    F: Fn(&LogEntry) -> bool + Send + Sync,
{
    fn should_log(&self, entry: &LogEntry) -> bool {
        self(entry)
    }
}

/// Passes entries at or above a minimum level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelFilter {
    min_level: LogLevel,
}

impl LevelFilter {
    pub fn new(min_level: LogLevel) -> Self {
        Self { min_level }
    }

    pub fn min_level(&self) -> LogLevel {
        self.min_level
    }
}

impl Filter for LevelFilter {
    fn should_log(&self, entry: &LogEntry) -> bool {
        entry.level >= self.min_level
    }
}

/// Comparison applied by a [`FieldFilter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    Eq,
    Ne,
    /// Substring match; only string values can contain anything
    Contains,
}

/// Matches one field against an expected value
///
/// An entry without the field never passes, whatever the operator.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    field: String,
    value: FieldValue,
    op: FieldOp,
}

impl FieldFilter {
    pub fn new(field: impl Into<String>, value: impl Into<FieldValue>, op: FieldOp) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            op,
        }
    }

    pub fn equals(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::new(field, value, FieldOp::Eq)
    }

    pub fn not_equals(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::new(field, value, FieldOp::Ne)
    }

    pub fn contains(field: impl Into<String>, needle: impl Into<String>) -> Self {
        Self::new(field, FieldValue::String(needle.into()), FieldOp::Contains)
    }
}

impl Filter for FieldFilter {
    fn should_log(&self, entry: &LogEntry) -> bool {
        let Some(actual) = entry.fields.get(&self.field) else {
            return false;
        };

        match self.op {
            FieldOp::Eq => actual == &self.value,
            FieldOp::Ne => actual != &self.value,
            FieldOp::Contains => match (actual.as_str(), self.value.as_str()) {
                (Some(haystack), Some(needle)) => haystack.contains(needle),
                _ => false,
            },
        }
    }
}

/// How a [`CompositeFilter`] combines its children
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeMode {
    And,
    Or,
}

/// Combines filters with AND or OR; an empty composite passes everything
#[derive(Clone)]
pub struct CompositeFilter {
    mode: CompositeMode,
    filters: Vec<Arc<dyn Filter>>,
}

impl CompositeFilter {
    pub fn new(mode: CompositeMode) -> Self {
        Self {
            mode,
            filters: Vec::new(),
        }
    }

    pub fn all() -> Self {
        Self::new(CompositeMode::And)
    }

    pub fn any() -> Self {
        Self::new(CompositeMode::Or)
    }

    #[must_use]
    pub fn with<F: Filter + 'static>(mut self, filter: F) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    #[must_use]
    pub fn with_shared(mut self, filter: Arc<dyn Filter>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl Filter for CompositeFilter {
    fn should_log(&self, entry: &LogEntry) -> bool {
        if self.filters.is_empty() {
            return true;
        }
        match self.mode {
            CompositeMode::And => self.filters.iter().all(|f| f.should_log(entry)),
            CompositeMode::Or => self.filters.iter().any(|f| f.should_log(entry)),
        }
    }
}

impl fmt::Debug for CompositeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeFilter")
            .field("mode", &self.mode)
            .field("filters", &self.filters.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(level: LogLevel) -> LogEntry {
        LogEntry::new(level, "msg")
            .with_field("service", "billing-api")
            .with_field("status", 500)
    }

    #[test]
    fn test_level_filter() {
        let filter = LevelFilter::new(LogLevel::Warn);
        assert!(!filter.should_log(&entry(LogLevel::Info)));
        assert!(filter.should_log(&entry(LogLevel::Warn)));
        assert!(filter.should_log(&entry(LogLevel::Fatal)));
    }

    #[test]
    fn test_field_filter_eq_ne() {
        let e = entry(LogLevel::Info);
        assert!(FieldFilter::equals("status", 500).should_log(&e));
        assert!(!FieldFilter::equals("status", 200).should_log(&e));
        assert!(FieldFilter::not_equals("status", 200).should_log(&e));
        assert!(!FieldFilter::not_equals("status", 500).should_log(&e));
    }

    #[test]
    fn test_field_filter_contains() {
        let e = entry(LogLevel::Info);
        assert!(FieldFilter::contains("service", "billing").should_log(&e));
        assert!(!FieldFilter::contains("service", "auth").should_log(&e));
        // Non-string values never contain anything
        assert!(!FieldFilter::contains("status", "50").should_log(&e));
    }

    #[test]
    fn test_field_filter_missing_field() {
        let e = LogEntry::new(LogLevel::Info, "bare");
        assert!(!FieldFilter::equals("user", "x").should_log(&e));
        assert!(!FieldFilter::not_equals("user", "x").should_log(&e));
        assert!(!FieldFilter::contains("user", "x").should_log(&e));
    }

    #[test]
    fn test_composite_and_or() {
        let e = entry(LogLevel::Error);
        let and = CompositeFilter::all()
            .with(LevelFilter::new(LogLevel::Error))
            .with(FieldFilter::equals("status", 200));
        assert!(!and.should_log(&e));

        let or = CompositeFilter::any()
            .with(LevelFilter::new(LogLevel::Error))
            .with(FieldFilter::equals("status", 200));
        assert!(or.should_log(&e));
    }

    #[test]
    fn test_empty_composite_passes() {
        let e = entry(LogLevel::Debug);
        assert!(CompositeFilter::all().should_log(&e));
        assert!(CompositeFilter::any().should_log(&e));
    }

    #[test]
    fn test_closure_filter() {
        let filter = |e: &LogEntry| e.message.starts_with("keep");
        assert!(filter.should_log(&LogEntry::new(LogLevel::Info, "keep me")));
        assert!(!filter.should_log(&LogEntry::new(LogLevel::Info, "drop me")));
    }
}
