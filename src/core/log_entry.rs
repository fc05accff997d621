//! Log entry structure

use super::fields::{FieldValue, Fields};
use super::log_level::LogLevel;
use super::pool::Reset;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::panic::Location;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Fields::is_empty")]
    pub fields: Fields,
    /// Call site as `file:line`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller: Option<String>,
}

impl LogEntry {
    /// Escape line breaks and tabs so one entry can never render as several lines
    fn sanitize_into(target: &mut String, message: &str) {
        target.reserve(message.len());
        for c in message.chars() {
            match c {
                '\n' => target.push_str("\\n"),
                '\r' => target.push_str("\\r"),
                '\t' => target.push_str("\\t"),
                _ => target.push(c),
            }
        }
    }

    pub fn new(level: LogLevel, message: impl AsRef<str>) -> Self {
        let mut entry = Self::empty();
        entry.fill(level, message.as_ref());
        entry
    }

    /// A zeroed entry, the state pooled entries are reset to
    pub(crate) fn empty() -> Self {
        Self {
            timestamp: DateTime::<Utc>::default(),
            level: LogLevel::Debug,
            message: String::new(),
            fields: Fields::new(),
            caller: None,
        }
    }

    /// Populate a reset entry in place, reusing its allocations
    pub(crate) fn fill(&mut self, level: LogLevel, message: &str) {
        self.timestamp = Utc::now();
        self.level = level;
        self.message.clear();
        Self::sanitize_into(&mut self.message, message);
    }

    #[must_use]
    pub fn with_field<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<FieldValue>,
    {
        self.fields.insert(key, value);
        self
    }

    #[must_use]
    pub fn with_fields(mut self, fields: &Fields) -> Self {
        self.fields.merge_from(fields);
        self
    }

    #[must_use]
    pub fn with_caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = Some(caller.into());
        self
    }

    /// Record a source location as `file:line`, keeping only the file name
    pub(crate) fn set_location(&mut self, location: &Location<'_>) {
        let file = location.file();
        let name = file.rsplit(['/', '\\']).next().unwrap_or(file);
        self.caller = Some(format!("{}:{}", name, location.line()));
    }
}

impl Reset for LogEntry {
    fn reset(&mut self) {
        self.timestamp = DateTime::<Utc>::default();
        self.level = LogLevel::Debug;
        self.message.clear();
        self.fields.clear();
        self.caller = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_sanitized() {
        let entry = LogEntry::new(LogLevel::Info, "line1\nline2\tx\r");
        assert_eq!(entry.message, "line1\\nline2\\tx\\r");
    }

    #[test]
    fn test_reset_clears_state() {
        let mut entry = LogEntry::new(LogLevel::Error, "boom")
            .with_field("k", "v")
            .with_caller("main.rs:1");
        entry.reset();

        assert_eq!(entry, LogEntry::empty());
        assert_eq!(entry.timestamp.timestamp(), 0);
    }

    #[test]
    fn test_set_location_uses_file_name() {
        let mut entry = LogEntry::new(LogLevel::Info, "here");
        entry.set_location(Location::caller());
        let caller = entry.caller.expect("caller set");
        assert!(!caller.contains('/'));
        assert!(caller.contains(".rs:"));
    }

    #[test]
    fn test_serde_roundtrip_keeps_fields() {
        let entry = LogEntry::new(LogLevel::Warn, "disk").with_field("free_mb", 12);
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"free_mb\":12"));
        let back: LogEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }
}
