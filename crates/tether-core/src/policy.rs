//! Reconnect backoff policy.
//!
//! Delay for attempt `n` (1-based) is `min(base × 2^(n−1), max)`. After
//! `max_attempts` consecutive failures no further automatic attempt is
//! scheduled; an external trigger (foregrounding, forced reconnect) has to
//! reset the budget.

use std::time::Duration;

/// Default ceiling on consecutive automatic reconnect attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default delay before the first reconnect attempt.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Default upper bound on any reconnect delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(10_000);

/// Exponential backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Consecutive automatic attempts before giving up.
    pub max_attempts: u32,
    /// Delay before attempt 1.
    pub base_delay: Duration,
    /// Cap applied to every delay.
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the given attempt. Attempt 0 is treated as attempt 1.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.max(1) - 1;
        let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
        self.base_delay.checked_mul(factor).map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

/// Attempt counter bounded by a [`ReconnectPolicy`].
#[derive(Debug, Clone)]
pub struct ReconnectBudget {
    policy: ReconnectPolicy,
    attempt: u32,
}

impl ReconnectBudget {
    /// Fresh budget with no attempts spent.
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Spend one attempt.
    ///
    /// Returns the attempt number and its delay, or `None` once the ceiling
    /// has been reached. An exhausted budget stays exhausted until
    /// [`reset`](Self::reset).
    pub fn next(&mut self) -> Option<(u32, Duration)> {
        if self.is_exhausted() {
            return None;
        }
        self.attempt += 1;
        Some((self.attempt, self.policy.delay_for(self.attempt)))
    }

    /// Attempts spent since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Whether every attempt has been spent.
    pub fn is_exhausted(&self) -> bool {
        self.attempt >= self.policy.max_attempts
    }

    /// Forget all spent attempts.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Policy this budget enforces.
    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }
}
