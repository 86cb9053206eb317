//! Retry decisions and capped exponential backoff.
//!
//! `delay = base * 2^min(attempt, 4)`, never more than 30 seconds. The
//! exponent ceiling and the cap together bound the worst-case reconnect
//! latency no matter how many consecutive failures occur.

use std::time::Duration;
use tablesync_types::ErrorResult;

/// Default number of retries before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default upper bound for a single backoff delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);

/// Default ceiling for the backoff exponent.
pub const DEFAULT_EXPONENT_CAP: u32 = 4;

/// Decide whether a failed subscription should be retried.
///
/// False when there is no result, when `attempt_count` has reached
/// `max_attempts`, or when the category is permission/auth. Otherwise
/// follows the result's own retryable flag.
pub fn should_retry(result: Option<&ErrorResult>, attempt_count: u32, max_attempts: u32) -> bool {
    let Some(result) = result else {
        return false;
    };
    if attempt_count >= max_attempts {
        return false;
    }
    if result.category().is_terminal() {
        return false;
    }
    result.is_retryable()
}

/// Backoff delay for the given attempt using the default cap and ceiling.
pub fn next_delay(attempt_count: u32, base_delay_ms: u64) -> Duration {
    RetryPolicy::default().next_delay(attempt_count, base_delay_ms)
}

/// Tunable retry limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed per subscription lifetime.
    pub max_attempts: u32,
    /// Upper bound for a single delay.
    pub max_delay: Duration,
    /// Ceiling for the backoff exponent.
    pub exponent_cap: u32,
}

impl RetryPolicy {
    /// Whether to retry under this policy.
    pub fn should_retry(&self, result: Option<&ErrorResult>, attempt_count: u32) -> bool {
        should_retry(result, attempt_count, self.max_attempts)
    }

    /// Backoff delay under this policy.
    pub fn next_delay(&self, attempt_count: u32, base_delay_ms: u64) -> Duration {
        // Shift is bounded by exponent_cap (and by 63 to stay in range).
        let exponent = attempt_count.min(self.exponent_cap).min(63);
        let factor = 1u64 << exponent;
        let delay_ms = base_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay_ms).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_delay: DEFAULT_MAX_DELAY,
            exponent_cap: DEFAULT_EXPONENT_CAP,
        }
    }
}

/// Attempt counter for one subscription lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
    attempts: u32,
    last_delay: Option<Duration>,
}

impl RetryState {
    /// Fresh state, no attempts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Retries scheduled so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay of the most recently scheduled retry.
    pub fn last_delay(&self) -> Option<Duration> {
        self.last_delay
    }

    /// Record that a retry was scheduled with `delay`.
    pub fn record(&mut self, delay: Duration) {
        self.attempts = self.attempts.saturating_add(1);
        self.last_delay = Some(delay);
    }

    /// Back to zero after the subscription proved live.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
