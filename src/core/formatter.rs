//! Byte formatting for entries bound to byte-oriented sinks
//!
//! Built-in line formats:
//! - Text: `2025-01-08T10:30:45.123Z INFO  main.rs:42 Request processed user=7`
//! - Json: `{"timestamp":"...","level":"INFO","message":"...","caller":"...","fields":{...}}`
//! - Logfmt: `timestamp=... level=INFO caller=main.rs:42 msg="Request processed" user=7`

use super::error::Result;
use super::fields::FieldValue;
use super::log_entry::LogEntry;
use super::timestamp::TimestampFormat;
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Renders an entry to bytes
pub trait Formatter: Send + Sync {
    /// Append the rendering of `entry` to `buf`
    fn format_into(&self, entry: &LogEntry, buf: &mut Vec<u8>) -> Result<()>;

    fn format(&self, entry: &LogEntry) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.format_into(entry, &mut buf)?;
        Ok(buf)
    }
}

/// Output format for log lines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Logfmt,
}

/// Newline-terminated formatter for the built-in [`OutputFormat`]s
#[derive(Debug, Clone, Default)]
pub struct LineFormatter {
    format: OutputFormat,
    timestamp_format: TimestampFormat,
    hide_caller: bool,
}

impl LineFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            ..Default::default()
        }
    }

    pub fn text() -> Self {
        Self::new(OutputFormat::Text)
    }

    pub fn json() -> Self {
        Self::new(OutputFormat::Json)
    }

    pub fn logfmt() -> Self {
        Self::new(OutputFormat::Logfmt)
    }

    #[must_use]
    pub fn with_timestamp_format(mut self, format: TimestampFormat) -> Self {
        self.timestamp_format = format;
        self
    }

    /// Leave the `file:line` call site out of the output
    #[must_use]
    pub fn without_caller(mut self) -> Self {
        self.hide_caller = true;
        self
    }

    pub fn output_format(&self) -> OutputFormat {
        self.format
    }

    fn caller<'a>(&self, entry: &'a LogEntry) -> Option<&'a str> {
        if self.hide_caller {
            None
        } else {
            entry.caller.as_deref()
        }
    }

    fn write_text(&self, entry: &LogEntry, buf: &mut Vec<u8>) -> Result<()> {
        write!(
            buf,
            "{} {:5}",
            self.timestamp_format.format(&entry.timestamp),
            entry.level.to_str()
        )?;
        if let Some(caller) = self.caller(entry) {
            write!(buf, " {}", caller)?;
        }
        write!(buf, " {}", entry.message)?;
        if !entry.fields.is_empty() {
            write!(buf, " {}", entry.fields.format_fields())?;
        }
        Ok(())
    }

    fn write_json(&self, entry: &LogEntry, buf: &mut Vec<u8>) -> Result<()> {
        let mut obj = serde_json::Map::new();
        obj.insert(
            "timestamp".to_string(),
            self.timestamp_format.to_json_value(&entry.timestamp),
        );
        obj.insert(
            "level".to_string(),
            serde_json::Value::String(entry.level.to_str().to_string()),
        );
        obj.insert(
            "message".to_string(),
            serde_json::Value::String(entry.message.clone()),
        );
        if let Some(caller) = self.caller(entry) {
            obj.insert(
                "caller".to_string(),
                serde_json::Value::String(caller.to_string()),
            );
        }
        if !entry.fields.is_empty() {
            let fields = entry
                .fields
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json_value()))
                .collect();
            obj.insert("fields".to_string(), serde_json::Value::Object(fields));
        }
        serde_json::to_writer(&mut *buf, &serde_json::Value::Object(obj))?;
        Ok(())
    }

    fn write_logfmt(&self, entry: &LogEntry, buf: &mut Vec<u8>) -> Result<()> {
        write!(
            buf,
            "timestamp={} level={}",
            escape_logfmt_value(&self.timestamp_format.format(&entry.timestamp)),
            entry.level.to_str().to_lowercase()
        )?;
        if let Some(caller) = self.caller(entry) {
            write!(buf, " caller={}", escape_logfmt_value(caller))?;
        }
        write!(buf, " msg={}", quote_logfmt_value(&entry.message))?;

        let mut pairs: Vec<_> = entry.fields.iter().collect();
        pairs.sort_by(|a, b| a.0.cmp(b.0));
        for (key, value) in pairs {
            let rendered = match value {
                FieldValue::String(s) => escape_logfmt_value(s),
                other => other.to_string(),
            };
            write!(buf, " {}={}", escape_logfmt_key(key), rendered)?;
        }
        Ok(())
    }
}

impl Formatter for LineFormatter {
    fn format_into(&self, entry: &LogEntry, buf: &mut Vec<u8>) -> Result<()> {
        match self.format {
            OutputFormat::Text => self.write_text(entry, buf)?,
            OutputFormat::Json => self.write_json(entry, buf)?,
            OutputFormat::Logfmt => self.write_logfmt(entry, buf)?,
        }
        buf.push(b'\n');
        Ok(())
    }
}

/// Keep only characters that are safe in a logfmt key
fn escape_logfmt_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-' || *c == '.')
        .collect()
}

/// Quote a logfmt value when it would otherwise be ambiguous
fn escape_logfmt_value(value: &str) -> String {
    if value.is_empty() || value.contains([' ', '"', '=']) {
        quote_logfmt_value(value)
    } else {
        value.to_string()
    }
}

fn quote_logfmt_value(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}
