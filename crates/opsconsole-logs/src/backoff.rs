use std::time::Duration;

use rand::Rng;

use opsconsole_types::StreamConfig;

/// Smallest base delay a policy may use
pub const MIN_BACKOFF: Duration = Duration::from_millis(100);

/// Reconnect delay schedule
#[derive(Clone, Debug, PartialEq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
    pub jitter: bool,
}

impl From<&StreamConfig> for BackoffPolicy {
    fn from(config: &StreamConfig) -> Self {
        Self {
            base: config.backoff_base(),
            max: config.backoff_max(),
            jitter: config.jitter,
        }
        .normalized()
    }
}

impl BackoffPolicy {
    /// Raise the base to `MIN_BACKOFF` and the cap to at least the base
    pub fn normalized(self) -> Self {
        let base = self.base.max(MIN_BACKOFF);
        Self {
            base,
            max: self.max.max(base),
            jitter: self.jitter,
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from(&StreamConfig::default())
    }
}

/// Exponential backoff state: `min(base * 2^attempt, max)`
#[derive(Clone, Debug)]
pub struct Backoff {
    policy: BackoffPolicy,
    attempt: u32,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy: policy.normalized(),
            attempt: 0,
        }
    }

    /// Consecutive failures since the last reset
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay before the next attempt, advancing the schedule
    pub fn next_delay(&mut self) -> Duration {
        let factor = 2u32.saturating_pow(self.attempt);
        let delay = self.policy.base.saturating_mul(factor).min(self.policy.max);
        self.attempt = self.attempt.saturating_add(1);

        if self.policy.jitter {
            let spread = delay.as_millis() as u64 / 5;
            let extra = rand::thread_rng().gen_range(0..=spread);
            (delay + Duration::from_millis(extra)).min(self.policy.max)
        } else {
            delay
        }
    }

    /// Back to the base delay after a successful connection
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(jitter: bool) -> BackoffPolicy {
        BackoffPolicy {
            base: Duration::from_millis(500),
            max: Duration::from_secs(10),
            jitter,
        }
    }

    #[test]
    fn test_delays_double_up_to_cap() {
        let mut backoff = Backoff::new(policy(false));
        let delays: Vec<_> = (0..8).map(|_| backoff.next_delay().as_millis()).collect();
        assert_eq!(delays, [500, 1000, 2000, 4000, 8000, 10_000, 10_000, 10_000]);
    }

    #[test]
    fn test_non_decreasing_and_capped() {
        let mut backoff = Backoff::new(policy(false));
        let mut previous = Duration::ZERO;
        for _ in 0..100 {
            let delay = backoff.next_delay();
            assert!(delay >= previous);
            assert!(delay <= Duration::from_secs(10));
            previous = delay;
        }
    }

    #[test]
    fn test_reset_returns_to_base() {
        let mut backoff = Backoff::new(policy(false));
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
    }

    #[test]
    fn test_zero_config_never_spins() {
        let config = StreamConfig {
            backoff_base_ms: 0,
            backoff_max_ms: 0,
            ..Default::default()
        };
        let policy = BackoffPolicy::from(&config);
        assert_eq!(policy.base, MIN_BACKOFF);
        assert_eq!(policy.max, MIN_BACKOFF);

        // Literal policies are floored too
        let mut backoff = Backoff::new(BackoffPolicy {
            base: Duration::ZERO,
            max: Duration::from_secs(1),
            jitter: false,
        });
        let delays: Vec<_> = (0..5).map(|_| backoff.next_delay()).collect();
        assert!(delays.iter().all(|d| *d >= MIN_BACKOFF));
        assert_eq!(delays[1], MIN_BACKOFF * 2);
    }

    #[test]
    fn test_cap_below_base_is_raised() {
        let policy = BackoffPolicy {
            base: Duration::from_secs(2),
            max: Duration::from_millis(10),
            jitter: false,
        }
        .normalized();
        assert_eq!(policy.max, Duration::from_secs(2));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let mut backoff = Backoff::new(policy(true));
        for attempt in 0..20u32 {
            let delay = backoff.next_delay();
            let floor = Duration::from_millis(500)
                .saturating_mul(2u32.saturating_pow(attempt))
                .min(Duration::from_secs(10));
            assert!(delay >= floor);
            assert!(delay <= Duration::from_secs(10));
        }
    }
}
