//! Retry policy (spec §4.7): exponential/linear/constant backoff with
//! jitter, and the retryable/non-retryable classifier over [`ErrorKind`].

use std::time::Duration;

use crate::error::ErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    Linear,
    Exponential,
    Constant,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            strategy: BackoffStrategy::Exponential,
        }
    }
}

impl RetryPolicy {
    /// Whether `kind` should be retried at all (spec §4.7: retryable =
    /// Timeout/RateLimit/Transient5xx/Network-shaped errors; non-retryable
    /// = Validation, SchemaValidationError, any Security Gate error).
    pub fn is_retryable(&self, kind: ErrorKind) -> bool {
        kind.is_retryable()
    }

    /// Delay before attempt number `attempt` (1-indexed), including
    /// up-to-25% jitter so concurrent retries don't synchronize.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = match self.strategy {
            BackoffStrategy::Constant => self.base_delay,
            BackoffStrategy::Linear => self.base_delay.saturating_mul(attempt.max(1)),
            BackoffStrategy::Exponential => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1).min(20));
                self.base_delay.saturating_mul(factor)
            }
        };
        let capped = base.min(self.max_delay);
        let jitter_fraction: f64 = rand::random::<f64>() * 0.25;
        let jitter = Duration::from_secs_f64(capped.as_secs_f64() * jitter_fraction);
        (capped + jitter).min(self.max_delay)
    }

    pub fn should_retry(&self, attempt: u32, kind: ErrorKind) -> bool {
        attempt < self.max_attempts && self.is_retryable(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_retryable_kinds_never_retry() {
        let policy = RetryPolicy::default();
        assert!(!policy.should_retry(1, ErrorKind::SecurityDenied));
        assert!(!policy.should_retry(1, ErrorKind::SchemaValidation));
    }

    #[test]
    fn retryable_kind_retries_until_max_attempts() {
        let policy = RetryPolicy {
            max_attempts: 2,
            ..RetryPolicy::default()
        };
        assert!(policy.should_retry(1, ErrorKind::Timeout));
        assert!(!policy.should_retry(2, ErrorKind::Timeout));
    }

    #[test]
    fn exponential_backoff_grows_and_is_capped() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            strategy: BackoffStrategy::Exponential,
            ..RetryPolicy::default()
        };
        assert!(policy.delay_for_attempt(1) <= Duration::from_secs(1));
        assert!(policy.delay_for_attempt(10) <= Duration::from_secs(1));
    }
}
