//! Bounded retry for optimistic-concurrency conflicts.
//!
//! A retry here always means "re-read and try again": callers re-fetch the
//! row version between attempts, so the policy only decides how many times
//! and how long to wait.

use std::time::Duration;

use crate::Dependency;

/// Pause between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    None,
    Fixed(Duration),
    /// `base * 2^attempt`, capped at `max`.
    Exponential { base: Duration, max: Duration },
}

impl BackoffStrategy {
    /// Delay before retry number `attempt` (0 = first retry).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match *self {
            Self::None => Duration::ZERO,
            Self::Fixed(delay) => delay,
            Self::Exponential { base, max } => {
                base.saturating_mul(2u32.saturating_pow(attempt)).min(max)
            }
        }
    }
}

impl Default for BackoffStrategy {
    /// Row conflicts clear within a few milliseconds.
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_millis(1),
            max: Duration::from_millis(20),
        }
    }
}

/// How often a conflicting operation is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub backoff: BackoffStrategy,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: BackoffStrategy::default(),
        }
    }

    /// Fail on the first conflict.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff: BackoffStrategy::None,
        }
    }

    pub fn for_dependency(dependency: Dependency) -> Self {
        Self::new(dependency.default_max_retries())
    }

    pub fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Whether another try is allowed after `retries` retries.
    pub fn allows(&self, retries: u32) -> bool {
        retries < self.max_retries
    }

    pub fn delay(&self, retries: u32) -> Duration {
        self.backoff.delay_for_attempt(retries)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_caps() {
        let backoff = BackoffStrategy::Exponential {
            base: Duration::from_millis(10),
            max: Duration::from_millis(50),
        };
        assert_eq!(backoff.delay_for_attempt(0), Duration::from_millis(10));
        assert_eq!(backoff.delay_for_attempt(2), Duration::from_millis(40));
        assert_eq!(backoff.delay_for_attempt(40), Duration::from_millis(50));
    }

    #[test]
    fn test_retry_budget() {
        let policy = RetryPolicy::new(2);
        assert!(policy.allows(0));
        assert!(policy.allows(1));
        assert!(!policy.allows(2));
        assert!(!RetryPolicy::none().allows(0));
    }

    #[test]
    fn test_ledger_default_budget() {
        let policy = RetryPolicy::for_dependency(Dependency::Ledger)
            .with_backoff(BackoffStrategy::Fixed(Duration::from_millis(2)));
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.delay(5), Duration::from_millis(2));
    }
}
