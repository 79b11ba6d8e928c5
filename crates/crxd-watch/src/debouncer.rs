//! Trailing-edge debouncing.
//!
//! Collapses a burst of change events into a single trigger once the source
//! has been quiet for a full window.

use std::time::Duration;

use tokio::time::Instant;

/// Single-deadline debouncer.
///
/// Holds at most one pending deadline. Recording an event replaces it, so an
/// unbroken stream of events faster than the window postpones the trigger
/// indefinitely.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    /// Create a debouncer with the given quiet window.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    /// Record an event at `now`, re-arming the deadline.
    pub fn record(&mut self, now: Instant) {
        self.deadline = Some(now + self.window);
    }

    /// Consume the pending trigger if its deadline has passed.
    ///
    /// Returns `true` at most once per armed deadline.
    pub fn take_ready(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Pending deadline, for timer scheduling.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether a trigger is pending.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }
}
