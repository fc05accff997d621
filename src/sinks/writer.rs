//! Byte-oriented sink over any `io::Write`

use crate::core::error::Result;
use crate::core::formatter::{Formatter, LineFormatter};
use crate::core::log_entry::LogEntry;
use crate::core::pool::BufferPool;
use crate::core::sink::Sink;
use std::io::{self, Write};

const DEFAULT_BUFFER_CAPACITY: usize = 512;
const DEFAULT_BUFFER_POOL_SIZE: usize = 16;

/// Formats entries to bytes and writes them to `W`
///
/// Formatting happens in buffers taken from a [`BufferPool`], one write per
/// entry.
///
/// # Example
///
/// ```
/// use rust_structured_logger::core::{LineFormatter, LogEntry, LogLevel, Sink};
/// use rust_structured_logger::sinks::WriterSink;
///
/// let mut sink = WriterSink::new(Vec::new(), LineFormatter::json());
/// sink.append(&LogEntry::new(LogLevel::Info, "ready")).unwrap();
///
/// let output = String::from_utf8(sink.get_ref().clone()).unwrap();
/// assert!(output.contains("\"message\":\"ready\""));
/// ```
pub struct WriterSink<W: Write + Send> {
    writer: W,
    formatter: Box<dyn Formatter>,
    buffers: BufferPool,
    name: String,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new<F: Formatter + 'static>(writer: W, formatter: F) -> Self {
        Self::with_boxed_formatter(writer, Box::new(formatter))
    }

    pub fn with_boxed_formatter(writer: W, formatter: Box<dyn Formatter>) -> Self {
        Self {
            writer,
            formatter,
            buffers: BufferPool::for_buffers(DEFAULT_BUFFER_POOL_SIZE, DEFAULT_BUFFER_CAPACITY),
            name: "writer".to_string(),
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn buffer_pool(&self) -> &BufferPool {
        &self.buffers
    }
}

impl WriterSink<io::Stdout> {
    pub fn stdout() -> Self {
        WriterSink::new(io::stdout(), LineFormatter::text()).with_name("stdout")
    }
}

impl WriterSink<io::Stderr> {
    pub fn stderr() -> Self {
        WriterSink::new(io::stderr(), LineFormatter::text()).with_name("stderr")
    }
}

impl<W: Write + Send> Sink for WriterSink<W> {
    fn append(&mut self, entry: &LogEntry) -> Result<()> {
        let mut buf = self.buffers.get();
        let result = self
            .formatter
            .format_into(entry, &mut buf)
            .and_then(|()| self.writer.write_all(&buf).map_err(Into::into));
        self.buffers.put(buf);
        result
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.flush()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::LogLevel;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_writer_sink_text_lines() {
        let mut sink = WriterSink::new(Vec::new(), LineFormatter::text());
        sink.append(&LogEntry::new(LogLevel::Info, "first")).unwrap();
        sink.append(&LogEntry::new(LogLevel::Warn, "second")).unwrap();

        let output = String::from_utf8(sink.get_ref().clone()).unwrap();
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("first"));
        assert!(lines[1].contains("WARN"));
    }

    #[test]
    fn test_writer_sink_reuses_buffers() {
        let mut sink = WriterSink::new(Vec::new(), LineFormatter::logfmt());
        for i in 0..10 {
            sink.append(&LogEntry::new(LogLevel::Info, format!("m{}", i)))
                .unwrap();
        }
        let metrics = sink.buffer_pool().metrics();
        assert_eq!(metrics.misses, 1);
        assert_eq!(metrics.hits, 9);
    }

    #[test]
    fn test_writer_sink_to_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("app.log");
        let file = fs::File::create(&path).expect("Failed to create log file");

        let mut sink = WriterSink::new(file, LineFormatter::json()).with_name("file");
        sink.append(&LogEntry::new(LogLevel::Error, "disk full").with_field("free", 0))
            .unwrap();
        sink.close().unwrap();

        let content = fs::read_to_string(&path).expect("Failed to read log file");
        let parsed: serde_json::Value = serde_json::from_str(content.trim_end()).unwrap();
        assert_eq!(parsed["message"], "disk full");
        assert_eq!(parsed["fields"]["free"], 0);
        assert_eq!(sink.name(), "file");
    }
}
