//! Bounded retry with exponential backoff and jitter.
//!
//! The policy is a plain value handed to each fetch, so call sites can swap
//! it (tests use [`RetryPolicy::immediate`]). One initial attempt is followed
//! by up to `max_retries` retries. Before retry `k` (1-based) the caller
//! sleeps `base_delay * 2^(k-1)` plus a uniform jitter in `[0, max_jitter]`.

use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use super::provider::DataError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_jitter: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_jitter: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_jitter,
        }
    }

    /// Same attempt budget, no sleeping.
    pub fn immediate(max_retries: u32) -> Self {
        Self::new(max_retries, Duration::ZERO, Duration::ZERO)
    }

    /// Total attempts including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Deterministic part of the delay before retry `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exp)
    }

    /// Full delay before retry `retry`, including jitter.
    pub fn delay_for(&self, retry: u32, rng: &mut impl Rng) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rng.gen_range(0..=jitter_ms))
        };
        self.backoff(retry) + jitter
    }

    /// Run `op` until it succeeds, fails with a non-transient error, or the
    /// attempt budget is spent.
    ///
    /// `op` receives the zero-based attempt number. Exhaustion surfaces as
    /// [`DataError::ProviderUnavailable`] wrapping the last error.
    pub fn run<T, F>(&self, label: &str, mut op: F) -> Result<T, DataError>
    where
        F: FnMut(u32) -> Result<T, DataError>,
    {
        let mut rng = rand::thread_rng();
        let attempts = self.max_attempts();
        let mut attempt = 0;

        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_transient() => return Err(err),
                Err(err) => {
                    attempt += 1;
                    if attempt >= attempts {
                        warn!(%label, attempts, error = %err, "retries exhausted");
                        return Err(DataError::ProviderUnavailable {
                            attempts,
                            last: Box::new(err),
                        });
                    }
                    let delay = self.delay_for(attempt, &mut rng);
                    debug!(%label, attempt, ?delay, error = %err, "transient failure, backing off");
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn flaky(failures: u32) -> impl FnMut(u32) -> Result<u32, DataError> {
        move |attempt| {
            if attempt < failures {
                Err(DataError::NetworkUnreachable(format!("attempt {attempt}")))
            } else {
                Ok(attempt)
            }
        }
    }

    #[test]
    fn succeeds_after_max_retries_failures() {
        let policy = RetryPolicy::immediate(3);
        assert_eq!(policy.run("test", flaky(3)).unwrap(), 3);
    }

    #[test]
    fn exhaustion_wraps_last_error() {
        let policy = RetryPolicy::immediate(3);
        match policy.run("test", flaky(4)) {
            Err(DataError::ProviderUnavailable { attempts, last }) => {
                assert_eq!(attempts, 4);
                assert!(last.to_string().contains("attempt 3"));
            }
            other => panic!("expected ProviderUnavailable, got {other:?}"),
        }
    }

    #[test]
    fn permanent_errors_are_not_retried() {
        let policy = RetryPolicy::immediate(3);
        let mut calls = 0;
        let result: Result<(), _> = policy.run("test", |_| {
            calls += 1;
            Err(DataError::empty("AAPL", "bars"))
        });
        assert!(matches!(result, Err(DataError::EmptyResult { .. })));
        assert_eq!(calls, 1);
    }

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100), Duration::ZERO);
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100), Duration::from_millis(50));
        let mut rng = StdRng::seed_from_u64(7);
        for retry in 1..=3 {
            let delay = policy.delay_for(retry, &mut rng);
            let base = policy.backoff(retry);
            assert!(delay >= base);
            assert!(delay <= base + Duration::from_millis(50));
        }
    }
}
