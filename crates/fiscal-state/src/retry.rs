//! Retry budget and exponential backoff between job re-queues.
//!
//! The n-th failed attempt (1-based) re-queues the job after
//! `base_delay × 2^(n−1)`, capped at `max_delay`: with the defaults that is
//! 5s, 10s, 20s, ... up to 10 minutes.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default attempts before a job fails for good.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay after the first failed attempt.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(5);

/// Default ceiling on the backoff delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(600);

/// Bounded-retry policy for jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts allowed, including the first. At least 1.
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Delay before the job may run again after `attempts` failed attempts.
    ///
    /// `attempts` of 0 is treated as 1.
    pub fn backoff(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Earliest instant a job that has failed `attempts` times may be
    /// claimed again.
    pub fn available_at(&self, now: DateTime<Utc>, attempts: u32) -> DateTime<Utc> {
        chrono::Duration::from_std(self.backoff(attempts))
            .ok()
            .and_then(|delay| now.checked_add_signed(delay))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}
