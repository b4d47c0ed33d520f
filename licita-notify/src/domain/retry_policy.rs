//! Retry policy value object.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential backoff for failed deliveries.
///
/// The delay before the next attempt after `attempts` failures is
/// `min(base_delay_ms * multiplier^(attempts - 1), max_delay_ms)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay after the first failure, in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Upper bound for any single delay, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Add up to 25% random jitter on top of the computed delay.
    #[serde(default)]
    pub use_jitter: bool,
}

fn default_base_delay_ms() -> u64 {
    5_000
}

fn default_max_delay_ms() -> u64 {
    300_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl RetryPolicy {
    pub fn new(base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
            ..Default::default()
        }
    }

    /// Delay to wait after the `attempts`-th failed attempt (1-indexed).
    ///
    /// An `attempts` of zero is treated as one.
    pub fn delay_for_attempt(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(63) as i32;
        let base_delay = self.base_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let delay_ms = base_delay.min(self.max_delay_ms as f64) as u64;

        if self.use_jitter {
            let jitter = (delay_ms as f64 * 0.25 * rand::random::<f64>()) as u64;
            Duration::from_millis(delay_ms + jitter)
        } else {
            Duration::from_millis(delay_ms)
        }
    }

    /// Whether a job that has made `attempts` attempts may try again.
    pub fn should_retry(attempts: u32, max_attempts: u32) -> bool {
        attempts < max_attempts
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.base_delay_ms == 0 {
            return Err(crate::Error::config("retry.base_delay_ms must be positive"));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(crate::Error::config(
                "retry.max_delay_ms must not be lower than retry.base_delay_ms",
            ));
        }
        if self.backoff_multiplier.is_nan() || self.backoff_multiplier < 1.0 {
            return Err(crate::Error::config("retry.backoff_multiplier must be >= 1.0"));
        }
        Ok(())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            use_jitter: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.base_delay_ms, 5_000);
        assert_eq!(policy.max_delay_ms, 300_000);
        assert!(!policy.use_jitter);
    }

    #[rstest]
    #[case(0, 5_000)]
    #[case(1, 5_000)]
    #[case(2, 10_000)]
    #[case(3, 20_000)]
    #[case(6, 160_000)]
    #[case(7, 300_000)]
    #[case(40, 300_000)]
    fn test_delay_for_attempt(#[case] attempts: u32, #[case] expected_ms: u64) {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(attempts), Duration::from_millis(expected_ms));
    }

    #[test]
    fn test_delay_is_monotonic_and_capped() {
        let policy = RetryPolicy::new(1_000, 45_000);
        let mut previous = Duration::ZERO;
        for attempts in 1..=100 {
            let delay = policy.delay_for_attempt(attempts);
            assert!(delay >= previous);
            assert!(delay <= Duration::from_millis(45_000));
            previous = delay;
        }
    }

    #[test]
    fn test_jitter_bounds() {
        let policy = RetryPolicy {
            use_jitter: true,
            ..RetryPolicy::new(1_000, 60_000)
        };
        for _ in 0..50 {
            let delay = policy.delay_for_attempt(2);
            assert!(delay >= Duration::from_millis(2_000));
            assert!(delay <= Duration::from_millis(2_500));
        }
    }

    #[test]
    fn test_should_retry() {
        assert!(RetryPolicy::should_retry(1, 3));
        assert!(RetryPolicy::should_retry(2, 3));
        assert!(!RetryPolicy::should_retry(3, 3));
    }

    #[test]
    fn test_validate() {
        assert!(RetryPolicy::default().validate().is_ok());
        assert!(RetryPolicy::new(0, 10).validate().is_err());
        assert!(RetryPolicy::new(10_000, 5_000).validate().is_err());
    }
}
