//! Overflow policies for the dispatcher queue
//!
//! When the bounded queue is full, the policy decides what happens to the
//! entry being enqueued. Every non-blocking outcome is counted; overload is
//! never reported to the caller as an error.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Policy for handling a full dispatcher queue
///
/// # Example
///
/// ```
/// use rust_structured_logger::core::OverflowPolicy;
/// use std::time::Duration;
///
/// // Default behavior: alert and drop
/// assert_eq!(OverflowPolicy::default(), OverflowPolicy::AlertAndDrop);
///
/// // Opt-in backpressure with a bound
/// let policy = OverflowPolicy::BlockWithTimeout(Duration::from_millis(100));
/// assert!(policy.may_block());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Drop the new entry and count it
    DropNewest,

    /// Evict the oldest queued entry to make room for the new one
    DropOldest,

    /// Wait until space is available
    ///
    /// Puts backpressure on every logging call site.
    Block,

    /// Wait up to the timeout, then drop
    BlockWithTimeout(Duration),

    /// Drop the new entry, count it, and alert via stderr and the callback
    #[default]
    AlertAndDrop,
}

impl OverflowPolicy {
    /// Map the `drop_on_full` configuration flag to a policy
    pub fn from_drop_on_full(drop_on_full: bool) -> Self {
        if drop_on_full {
            OverflowPolicy::AlertAndDrop
        } else {
            OverflowPolicy::Block
        }
    }

    /// Whether `log` can wait on a full queue under this policy
    pub fn may_block(&self) -> bool {
        matches!(
            self,
            OverflowPolicy::Block | OverflowPolicy::BlockWithTimeout(_)
        )
    }
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverflowPolicy::DropNewest => write!(f, "DropNewest"),
            OverflowPolicy::DropOldest => write!(f, "DropOldest"),
            OverflowPolicy::Block => write!(f, "Block"),
            OverflowPolicy::BlockWithTimeout(d) => write!(f, "BlockWithTimeout({:?})", d),
            OverflowPolicy::AlertAndDrop => write!(f, "AlertAndDrop"),
        }
    }
}

/// Callback for overflow notifications
///
/// Receives the total count of dropped entries so far.
pub type OverflowCallback = Arc<dyn Fn(u64) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overflow_policy_default() {
        assert_eq!(OverflowPolicy::default(), OverflowPolicy::AlertAndDrop);
    }

    #[test]
    fn test_from_drop_on_full() {
        assert_eq!(
            OverflowPolicy::from_drop_on_full(true),
            OverflowPolicy::AlertAndDrop
        );
        assert_eq!(OverflowPolicy::from_drop_on_full(false), OverflowPolicy::Block);
    }

    #[test]
    fn test_may_block() {
        assert!(!OverflowPolicy::DropNewest.may_block());
        assert!(!OverflowPolicy::DropOldest.may_block());
        assert!(!OverflowPolicy::AlertAndDrop.may_block());
        assert!(OverflowPolicy::Block.may_block());
        assert!(OverflowPolicy::BlockWithTimeout(Duration::from_millis(5)).may_block());
    }

    #[test]
    fn test_overflow_policy_display() {
        assert_eq!(OverflowPolicy::DropNewest.to_string(), "DropNewest");
        assert_eq!(OverflowPolicy::DropOldest.to_string(), "DropOldest");
        assert_eq!(OverflowPolicy::Block.to_string(), "Block");
        assert_eq!(
            OverflowPolicy::BlockWithTimeout(Duration::from_millis(100)).to_string(),
            "BlockWithTimeout(100ms)"
        );
        assert_eq!(OverflowPolicy::AlertAndDrop.to_string(), "AlertAndDrop");
    }
}
