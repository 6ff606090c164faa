use std::time::Duration;

use rand::Rng;

/// Exponential backoff with jitter for transient provider errors. Defaults:
/// 1s base, 60s cap, ±500ms jitter, 10 attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_delay_ms: u64,
    /// Ceiling the exponential delay is capped at.
    pub max_delay_ms: u64,
    /// Jitter applied symmetrically around the capped delay.
    pub jitter_ms: u64,
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_delay_ms: 60_000,
            jitter_ms: 500,
            max_attempts: 10,
        }
    }
}

impl RetryPolicy {
    /// The delay to sleep before retry attempt number `attempt` (0-based:
    /// `attempt == 0` is the delay before the first retry, after the
    /// initial failed try).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponential = self.base_delay_ms.saturating_mul(1u64 << attempt.min(20));
        let capped = exponential.min(self.max_delay_ms) as i64;
        let jitter: i64 = if self.jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(-(self.jitter_ms as i64)..=(self.jitter_ms as i64))
        };
        Duration::from_millis((capped + jitter).max(0) as u64)
    }

    /// Whether `attempt` (0-based, counting only retries) is still within
    /// budget.
    #[must_use]
    pub fn allows_attempt(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_exponentially_until_capped() {
        let policy = RetryPolicy {
            jitter_ms: 0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for(0).as_millis(), 1000);
        assert_eq!(policy.delay_for(1).as_millis(), 2000);
        assert_eq!(policy.delay_for(2).as_millis(), 4000);
    }

    #[test]
    fn delay_is_capped_at_max() {
        let policy = RetryPolicy {
            jitter_ms: 0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for(10).as_millis(), 60_000);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy::default();
        for attempt in 0..5 {
            let delay = policy.delay_for(attempt).as_millis() as i64;
            let capped = (policy.base_delay_ms.saturating_mul(1u64 << attempt)).min(policy.max_delay_ms) as i64;
            assert!(delay >= (capped - policy.jitter_ms as i64).max(0));
            assert!(delay <= capped + policy.jitter_ms as i64);
        }
    }

    #[test]
    fn default_attempt_budget_is_ten() {
        let policy = RetryPolicy::default();
        assert!(policy.allows_attempt(9));
        assert!(!policy.allows_attempt(10));
    }
}
