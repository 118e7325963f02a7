//! Per-provider retry policy
//!
//! Retries apply only to transient failures and only before any response
//! byte has reached the caller. Delays grow exponentially with a small
//! random jitter so that concurrent retries against a rate-limited
//! upstream do not land in lockstep.

use std::time::Duration;

use rand::Rng;

use crate::config::RetrySettings;

use super::error::ProviderError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the initial attempt, per provider
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub exponential_base: f64,
    /// Fraction of the delay randomized in both directions
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay_ms: 200,
            max_delay_ms: 10_000,
            exponential_base: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            initial_delay_ms: settings.initial_delay_ms,
            max_delay_ms: settings.max_delay_ms,
            ..Self::default()
        }
    }
}

impl RetryPolicy {
    /// Whether another attempt should follow this failure
    pub fn should_retry(&self, error: &ProviderError, attempt: u32) -> bool {
        attempt < self.max_retries && error.is_transient()
    }

    /// Backoff before retry number `attempt` (zero-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponential =
            self.initial_delay_ms as f64 * self.exponential_base.powi(attempt as i32);
        let capped = exponential.min(self.max_delay_ms as f64);
        let jitter = if self.jitter_factor > 0.0 {
            let spread = capped * self.jitter_factor;
            rand::thread_rng().gen_range(-spread..=spread)
        } else {
            0.0
        };
        Duration::from_millis((capped + jitter).max(0.0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> RetryPolicy {
        RetryPolicy {
            jitter_factor: 0.0,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn delay_grows_exponentially_and_caps() {
        let policy = no_jitter();
        assert_eq!(policy.delay_for(0), Duration::from_millis(200));
        assert_eq!(policy.delay_for(1), Duration::from_millis(400));
        assert_eq!(policy.delay_for(2), Duration::from_millis(800));
        assert_eq!(policy.delay_for(10), Duration::from_millis(10_000));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy::default();
        for attempt in 0..4 {
            let base = no_jitter().delay_for(attempt).as_millis() as f64;
            let delay = policy.delay_for(attempt).as_millis() as f64;
            assert!(delay >= base * 0.9 - 1.0 && delay <= base * 1.1 + 1.0);
        }
    }

    #[test]
    fn retries_only_transient_errors_within_budget() {
        let policy = RetryPolicy::default();
        let transient = ProviderError::Upstream {
            status: 503,
            body: String::new(),
        };
        let permanent = ProviderError::Upstream {
            status: 401,
            body: String::new(),
        };
        assert!(policy.should_retry(&transient, 0));
        assert!(policy.should_retry(&transient, 1));
        assert!(!policy.should_retry(&transient, 2));
        assert!(!policy.should_retry(&permanent, 0));
    }
}
