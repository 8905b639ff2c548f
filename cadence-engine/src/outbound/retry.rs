//! Exponential backoff for outbound notification retries

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// ```ron
/// retry: (max_attempts: 5, base_retry_delay_secs: 60, max_retry_delay_secs: 3600, retry_jitter_factor: 0.1),
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts before a task is given up on
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// First retry waits this long, doubling on each further failure
    #[serde(default = "defaults::base_retry_delay_secs")]
    pub base_retry_delay_secs: u64,

    #[serde(default = "defaults::max_retry_delay_secs")]
    pub max_retry_delay_secs: u64,

    /// Delays are randomised within ±this fraction
    #[serde(default = "defaults::retry_jitter_factor")]
    pub retry_jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            base_retry_delay_secs: defaults::base_retry_delay_secs(),
            max_retry_delay_secs: defaults::max_retry_delay_secs(),
            retry_jitter_factor: defaults::retry_jitter_factor(),
        }
    }
}

impl RetryPolicy {
    /// Whether a task that has failed `attempts` times gets another go
    #[must_use]
    pub const fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// When to try again after the `attempts`-th failure
    #[must_use]
    pub fn next_attempt_at(&self, attempts: u32, now: DateTime<Utc>) -> DateTime<Utc> {
        now + backoff_delay(
            attempts,
            self.base_retry_delay_secs,
            self.max_retry_delay_secs,
            self.retry_jitter_factor,
        )
    }
}

mod defaults {
    pub const fn max_attempts() -> u32 {
        5
    }

    pub const fn base_retry_delay_secs() -> u64 {
        60
    }

    pub const fn max_retry_delay_secs() -> u64 {
        3600
    }

    pub const fn retry_jitter_factor() -> f64 {
        0.1
    }
}

/// `min(base * 2^(attempt - 1), max) * (1 ± jitter)`, with `attempt` counted from 1
pub fn backoff_delay(
    attempt: u32,
    base_delay_secs: u64,
    max_delay_secs: u64,
    jitter_factor: f64,
) -> Duration {
    let exponent = attempt.saturating_sub(1);
    let delay = if exponent >= 63 {
        max_delay_secs
    } else {
        base_delay_secs
            .saturating_mul(1u64 << exponent)
            .min(max_delay_secs)
    };

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    let jittered = {
        let range = (delay as f64) * jitter_factor.abs();
        let jitter: f64 = if range > 0.0 {
            rand::rng().random_range(-range..=range)
        } else {
            0.0
        };
        ((delay as f64) + jitter).max(0.0) as i64
    };

    Duration::seconds(jittered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_until_capped() {
        assert_eq!(backoff_delay(1, 60, 3600, 0.0), Duration::seconds(60));
        assert_eq!(backoff_delay(2, 60, 3600, 0.0), Duration::seconds(120));
        assert_eq!(backoff_delay(3, 60, 3600, 0.0), Duration::seconds(240));
        assert_eq!(backoff_delay(10, 60, 3600, 0.0), Duration::seconds(3600));
        assert_eq!(backoff_delay(200, 60, 3600, 0.0), Duration::seconds(3600));
    }

    #[test]
    fn test_backoff_jitter_stays_in_range() {
        for _ in 0..50 {
            let delay = backoff_delay(2, 60, 3600, 0.2).num_seconds();
            assert!((96..=144).contains(&delay), "{delay} outside jitter range");
        }
    }

    #[test]
    fn test_policy_retry_budget() {
        let policy = RetryPolicy {
            max_attempts: 3,
            ..RetryPolicy::default()
        };

        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }
}
