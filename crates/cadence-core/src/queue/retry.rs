//! Retry policy: decides backoff delays.

use std::time::Duration;

/// Exponential backoff between attempts of one instance.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Additional attempts after the first one.
    pub max_retries: u32,

    /// Delay after the first failed attempt.
    pub base_delay: Duration,

    pub multiplier: f64,
}

impl RetryPolicy {
    /// Doubling backoff: `base_delay * 2^attempt`.
    pub fn exponential(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            multiplier: 2.0,
        }
    }

    /// Total number of handler invocations allowed.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay to wait after the failed attempt with zero-based index `attempt`.
    ///
    /// With base_delay=100ms, multiplier=2.0:
    /// - attempt 0: 100ms
    /// - attempt 1: 200ms
    /// - attempt 2: 400ms
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay_secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(delay_secs).unwrap_or(Duration::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 100)]
    #[case(1, 200)]
    #[case(2, 400)]
    #[case(3, 800)]
    fn delay_doubles_per_attempt(#[case] attempt: u32, #[case] expected_ms: u64) {
        let policy = RetryPolicy::exponential(5, Duration::from_millis(100));
        assert_eq!(policy.next_delay(attempt), Duration::from_millis(expected_ms));
    }

    #[test]
    fn max_attempts_includes_first_try() {
        assert_eq!(RetryPolicy::exponential(0, Duration::ZERO).max_attempts(), 1);
        assert_eq!(RetryPolicy::exponential(3, Duration::ZERO).max_attempts(), 4);
    }

    #[test]
    fn huge_attempt_saturates_instead_of_panicking() {
        let policy = RetryPolicy::exponential(u32::MAX, Duration::from_secs(1));
        assert_eq!(policy.next_delay(10_000), Duration::MAX);
    }
}
