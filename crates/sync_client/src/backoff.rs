use std::time::Duration;

use rand::Rng;

/// Reconnect delay schedule: exponential in the retry count, capped, with
/// uniform random jitter to avoid thundering-herd reconnects.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_fraction: f64,
}

impl BackoffPolicy {
    /// Delay before the next attempt, jitter included.
    pub fn delay(&self, retry_count: u32) -> Duration {
        let base = self.base_for(retry_count);
        if self.jitter_fraction <= 0.0 {
            return base;
        }
        let jitter = rand::thread_rng().gen_range(0.0..=self.jitter_fraction);
        base + base.mul_f64(jitter)
    }

    /// Pre-jitter delay: `min(base_delay * 2^retry_count, max_delay)`.
    pub fn base_for(&self, retry_count: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry_count.min(31));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(base_ms: u64, max_ms: u64, jitter: f64) -> BackoffPolicy {
        BackoffPolicy {
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_millis(max_ms),
            jitter_fraction: jitter,
        }
    }

    #[test]
    fn doubles_until_capped() {
        let policy = policy(1000, 30_000, 0.0);
        assert_eq!(policy.base_for(0), Duration::from_millis(1000));
        assert_eq!(policy.base_for(1), Duration::from_millis(2000));
        assert_eq!(policy.base_for(4), Duration::from_millis(16_000));
        // min(1000 * 2^5, 30000) = 30000
        assert_eq!(policy.base_for(5), Duration::from_millis(30_000));
        assert_eq!(policy.base_for(6), Duration::from_millis(30_000));
    }

    #[test]
    fn non_decreasing_and_bounded() {
        let policy = policy(250, 10_000, 0.0);
        let mut previous = Duration::ZERO;
        for retry_count in 0..64 {
            let delay = policy.delay(retry_count);
            assert!(delay >= previous);
            assert!(delay <= Duration::from_millis(10_000));
            previous = delay;
        }
    }

    #[test]
    fn jitter_stays_within_fraction() {
        let policy = policy(1000, 30_000, 0.5);
        for _ in 0..100 {
            let delay = policy.delay(3);
            assert!(delay >= Duration::from_millis(8000));
            assert!(delay <= Duration::from_millis(12_000));
        }
    }

    #[test]
    fn huge_retry_count_does_not_overflow() {
        let policy = policy(1000, 30_000, 0.0);
        assert_eq!(policy.base_for(u32::MAX), Duration::from_millis(30_000));
    }
}
