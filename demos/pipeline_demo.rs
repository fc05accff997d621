//! Pipeline example
//!
//! Demonstrates structured logging through a batcher and an asynchronous
//! dispatcher, writing JSON lines to stdout.
//!
//! Run with: cargo run --example pipeline_demo

use rust_structured_logger::prelude::*;
use rust_structured_logger::{info, warn};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn main() -> Result<()> {
    println!("=== Rust Structured Logger - Pipeline Example ===\n");

    let logger = Logger::builder()
        .level(LogLevel::Debug)
        .writer(std::io::stdout())
        .format(OutputFormat::Json)
        .field("service", "demo")
        .batching(BatcherConfig {
            batch_size: 20,
            flush_interval: Duration::from_millis(50),
            ..Default::default()
        })
        .dispatcher(DispatcherConfig {
            queue_capacity: 256,
            workers: 2,
            ..Default::default()
        })
        .overflow_policy(OverflowPolicy::AlertAndDrop)
        .on_overflow(Arc::new(|dropped| {
            eprintln!("queue overflow, {} entries dropped so far", dropped);
        }))
        .hook(
            FnHook::new(|entry: &LogEntry| {
                eprintln!("alert: {}", entry.message);
                Ok(())
            })
            .for_levels(&[LogLevel::Error, LogLevel::Fatal]),
        )
        .build()?;

    println!("1. Structured fields:");
    let requests = logger.with_field("component", "http");
    requests.info_with_fields(
        "request served",
        Fields::new().with_field("status", 200).with_field("latency_ms", 3.2),
    );
    logger.sync()?;

    println!("\n2. Multi-threaded logging:");
    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let logger = logger.with_field("worker", worker);
            thread::spawn(move || {
                for job in 0..5 {
                    info!(logger, "job {} finished", job);
                }
            })
        })
        .collect();
    for handle in handles {
        let _ = handle.join();
    }
    logger.sync()?;

    println!("\n3. Errors and hooks:");
    let err = std::io::Error::new(std::io::ErrorKind::TimedOut, "upstream timed out");
    logger.with_error(&err).error("payment failed");
    warn!(logger, "retrying in {}ms", 250);

    logger.close()?;

    let metrics = logger.metrics();
    println!("\n4. Metrics:");
    println!("   total: {}", metrics.total_logs);
    println!("   dropped: {}", metrics.dropped_logs);
    println!("   drop rate: {:.2}%", metrics.drop_rate());

    Ok(())
}
