//! Retry state machine
//!
//! One policy drives every retry loop in the workspace: fetching a source page,
//! re-running a failed resync, and re-queueing a failed background job.
//!
//! ```
//! use std::time::Duration;
//! use voterspheres_common::retry::{RetryDecision, RetryPolicy};
//!
//! let policy = RetryPolicy::new(3, Duration::from_millis(100), Duration::from_secs(1));
//! assert_eq!(policy.decide(1), RetryDecision::RetryAfter(Duration::from_millis(100)));
//! assert_eq!(policy.decide(2), RetryDecision::RetryAfter(Duration::from_millis(200)));
//! assert_eq!(policy.decide(3), RetryDecision::GiveUp);
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of attempts (including the first one)
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the first retry
pub const DEFAULT_BASE_DELAY_MS: u64 = 500;

/// Default ceiling for a single backoff delay
pub const DEFAULT_MAX_DELAY_MS: u64 = 60_000;

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again once the delay has elapsed
    RetryAfter(Duration),
    /// The attempt ceiling is reached
    GiveUp,
}

/// Exponential backoff with a bounded number of attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts allowed, the first one included
    pub max_attempts: u32,
    /// Delay before the first retry; doubles for each later retry
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Policy that never retries
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Backoff before retry number `attempt` (1-based: the delay after the first failure)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Decide what follows the failure of attempt number `attempts_made`
    pub fn decide(&self, attempts_made: u32) -> RetryDecision {
        if attempts_made >= self.max_attempts {
            RetryDecision::GiveUp
        } else {
            RetryDecision::RetryAfter(self.backoff(attempts_made))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(10, Duration::from_secs(1), Duration::from_secs(5));
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(4));
        assert_eq!(policy.backoff(4), Duration::from_secs(5));
        assert_eq!(policy.backoff(40), Duration::from_secs(5));
    }

    #[test]
    fn test_decide_gives_up_at_ceiling() {
        let policy = RetryPolicy::new(2, Duration::from_millis(10), Duration::from_secs(1));
        assert_eq!(
            policy.decide(1),
            RetryDecision::RetryAfter(Duration::from_millis(10))
        );
        assert_eq!(policy.decide(2), RetryDecision::GiveUp);
        assert_eq!(policy.decide(3), RetryDecision::GiveUp);
    }

    #[test]
    fn test_no_retry() {
        assert_eq!(RetryPolicy::no_retry().decide(1), RetryDecision::GiveUp);
    }

    #[test]
    fn test_zero_attempts_is_clamped() {
        let policy = RetryPolicy::new(0, Duration::ZERO, Duration::ZERO);
        assert_eq!(policy.max_attempts, 1);
    }
}
