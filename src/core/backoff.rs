//! Delay between retry attempts of the same job.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Computes how long to wait before the next attempt.
pub trait RetryBackoff: Send + Sync {
    /// Delay after `failed_attempts` failures (1-based).
    fn delay(&self, failed_attempts: u32) -> Duration;
}

/// Configurable backoff with optional uniform jitter.
///
/// Jitter adds a random `0..=jitter_ms` milliseconds on top of the base delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffPolicy {
    /// Retry immediately.
    None,
    /// Constant delay.
    Fixed {
        /// Base delay in milliseconds.
        delay_ms: u64,
        /// Maximum random extra delay in milliseconds.
        #[serde(default)]
        jitter_ms: u64,
    },
    /// `step_ms * failed_attempts`, capped at `max_ms`.
    Linear {
        /// Increment per failure in milliseconds.
        step_ms: u64,
        /// Upper bound in milliseconds.
        max_ms: u64,
        /// Maximum random extra delay in milliseconds.
        #[serde(default)]
        jitter_ms: u64,
    },
    /// `base_ms * 2^(failed_attempts - 1)`, capped at `max_ms`.
    Exponential {
        /// Delay after the first failure in milliseconds.
        base_ms: u64,
        /// Upper bound in milliseconds.
        max_ms: u64,
        /// Maximum random extra delay in milliseconds.
        #[serde(default)]
        jitter_ms: u64,
    },
}

impl Default for BackoffPolicy {
    /// One to two seconds, uniformly distributed.
    fn default() -> Self {
        Self::Fixed {
            delay_ms: 1_000,
            jitter_ms: 1_000,
        }
    }
}

impl BackoffPolicy {
    /// Fixed delay without jitter.
    #[must_use]
    pub const fn fixed(delay: Duration) -> Self {
        Self::Fixed {
            delay_ms: duration_ms(delay),
            jitter_ms: 0,
        }
    }

    /// Validate policy parameters.
    ///
    /// # Errors
    ///
    /// Returns a message when a cap is below its base value.
    pub fn validate(&self) -> Result<(), String> {
        match *self {
            Self::Linear { step_ms, max_ms, .. } if max_ms < step_ms => {
                Err("linear backoff max_ms must be >= step_ms".into())
            }
            Self::Exponential {
                base_ms, max_ms, ..
            } if max_ms < base_ms => Err("exponential backoff max_ms must be >= base_ms".into()),
            _ => Ok(()),
        }
    }

    /// Delay before jitter is applied.
    #[must_use]
    pub fn base_delay(&self, failed_attempts: u32) -> Duration {
        let n = failed_attempts.max(1);
        let ms = match *self {
            Self::None => 0,
            Self::Fixed { delay_ms, .. } => delay_ms,
            Self::Linear { step_ms, max_ms, .. } => step_ms.saturating_mul(u64::from(n)).min(max_ms),
            Self::Exponential {
                base_ms, max_ms, ..
            } => {
                let factor = 1u64 << (n - 1).min(20);
                base_ms.saturating_mul(factor).min(max_ms)
            }
        };
        Duration::from_millis(ms)
    }

    const fn jitter_ms(&self) -> u64 {
        match *self {
            Self::None => 0,
            Self::Fixed { jitter_ms, .. }
            | Self::Linear { jitter_ms, .. }
            | Self::Exponential { jitter_ms, .. } => jitter_ms,
        }
    }
}

impl RetryBackoff for BackoffPolicy {
    fn delay(&self, failed_attempts: u32) -> Duration {
        let base = self.base_delay(failed_attempts);
        let jitter = self.jitter_ms();
        if jitter == 0 {
            return base;
        }
        base + Duration::from_millis(rand::rng().random_range(0..=jitter))
    }
}

const fn duration_ms(d: Duration) -> u64 {
    let ms = d.as_millis();
    if ms > u64::MAX as u128 {
        u64::MAX
    } else {
        ms as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_waits_between_one_and_two_seconds() {
        let p = BackoffPolicy::default();
        for attempt in 1..=5 {
            let d = p.delay(attempt);
            assert!(d >= Duration::from_secs(1), "{d:?}");
            assert!(d <= Duration::from_secs(2), "{d:?}");
        }
    }

    #[test]
    fn test_none_is_immediate() {
        assert_eq!(BackoffPolicy::None.delay(3), Duration::ZERO);
    }

    #[test]
    fn test_exponential_grows_and_is_capped() {
        let p = BackoffPolicy::Exponential {
            base_ms: 100,
            max_ms: 1_000,
            jitter_ms: 0,
        };
        assert_eq!(p.delay(1), Duration::from_millis(100));
        assert_eq!(p.delay(2), Duration::from_millis(200));
        assert_eq!(p.delay(3), Duration::from_millis(400));
        assert_eq!(p.delay(10), Duration::from_millis(1_000));
        assert_eq!(p.delay(u32::MAX), Duration::from_millis(1_000));
    }

    #[test]
    fn test_linear_is_capped() {
        let p = BackoffPolicy::Linear {
            step_ms: 50,
            max_ms: 120,
            jitter_ms: 0,
        };
        assert_eq!(p.delay(1), Duration::from_millis(50));
        assert_eq!(p.delay(2), Duration::from_millis(100));
        assert_eq!(p.delay(3), Duration::from_millis(120));
    }

    #[test]
    fn test_validate_rejects_inverted_caps() {
        let p = BackoffPolicy::Exponential {
            base_ms: 500,
            max_ms: 100,
            jitter_ms: 0,
        };
        assert!(p.validate().is_err());
        assert!(BackoffPolicy::default().validate().is_ok());
    }

    #[test]
    fn test_deserializes_tagged_form() {
        let p: BackoffPolicy =
            serde_json::from_str(r#"{"kind":"fixed","delay_ms":5}"#).unwrap();
        assert_eq!(p, BackoffPolicy::fixed(Duration::from_millis(5)));
        let none: BackoffPolicy = serde_json::from_str(r#"{"kind":"none"}"#).unwrap();
        assert_eq!(none, BackoffPolicy::None);
    }
}
