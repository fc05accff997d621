//! Self-diagnostics written to stderr
//!
//! The engine cannot log through itself, so internal failures go to stderr.
//! Hot-path events report the first occurrence and then every
//! [`REPORT_EVERY`]th one.

use std::any::Any;

pub(crate) const REPORT_EVERY: u64 = 1000;

/// `count` is the running total including the current event
#[inline]
pub(crate) fn should_report(count: u64) -> bool {
    count == 1 || count % REPORT_EVERY == 0
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
