//! Per-connection inbound frame throttle.
//!
//! A fixed window that restarts once it has expired, rather than a true
//! sliding window. Every data frame counts, valid or not, so malformed
//! floods are bounded the same way as chat floods.

use std::time::Duration;

use tokio::time::Instant;

/// Throttle parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePolicy {
    /// Frames admitted per window.
    pub max_per_window: u32,
    /// Window length.
    pub window: Duration,
}

impl Default for RatePolicy {
    /// One frame per second: stricter than the client-side throttle, loose
    /// enough to absorb network jitter.
    fn default() -> Self {
        Self {
            max_per_window: 1,
            window: Duration::from_secs(1),
        }
    }
}

/// Window state for a single connection.
#[derive(Debug)]
pub struct RateLimiter {
    policy: RatePolicy,
    count: u32,
    window_start: Instant,
}

impl RateLimiter {
    /// Creates a limiter whose first window starts now.
    #[must_use]
    pub fn new(policy: RatePolicy) -> Self {
        Self {
            policy,
            count: 0,
            window_start: Instant::now(),
        }
    }

    /// Records one inbound frame and returns whether it is admitted.
    ///
    /// A rejected frame does not count towards the window.
    pub fn allow_message(&mut self) -> bool {
        self.allow_message_at(Instant::now())
    }

    fn allow_message_at(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.window_start) > self.policy.window {
            self.count = 0;
            self.window_start = now;
        }

        if self.count >= self.policy.max_per_window {
            return false;
        }

        self.count = self.count.saturating_add(1);
        true
    }

    /// Zeroes the counter and starts a fresh window now.
    ///
    /// Called after `auth` and `join` so the handshake never eats into the
    /// chat budget.
    pub fn reset(&mut self) {
        self.count = 0;
        self.window_start = Instant::now();
    }
}
