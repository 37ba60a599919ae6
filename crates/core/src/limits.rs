//! Outbound call discipline: token-bucket rate limiting and retry with
//! exponential backoff.
//!
//! Every connector call passes through both layers. The limiter paces calls
//! before they leave the process; the retry policy reacts to what the venue
//! sent back, waiting longer when the failure looks like throttling. The two
//! are independent on purpose: the limiter alone cannot see venue-side
//! responses, and the retry policy alone cannot prevent a burst.

use crate::error::ConnectorError;
use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use std::future::Future;
use std::num::NonZeroU32;
use std::time::Duration;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Token-bucket limiter: capacity = `burst`, refill = `calls_per_second`.
///
/// `acquire` suspends the caller until a token is available; callers are
/// delayed, never dropped. Construct one per venue at startup and inject it
/// into the connector.
pub struct ApiRateLimiter {
    inner: DirectLimiter,
    calls_per_second: u32,
    burst: u32,
}

impl ApiRateLimiter {
    /// # Errors
    /// Returns `ConnectorError::Configuration` when either parameter is zero.
    pub fn new(calls_per_second: u32, burst: u32) -> Result<Self, ConnectorError> {
        let rate = NonZeroU32::new(calls_per_second).ok_or_else(|| {
            ConnectorError::Configuration("calls_per_second must be non-zero".to_string())
        })?;
        let burst_nz = NonZeroU32::new(burst).ok_or_else(|| {
            ConnectorError::Configuration("burst must be non-zero".to_string())
        })?;

        let quota = Quota::per_second(rate).allow_burst(burst_nz);
        Ok(Self {
            inner: RateLimiter::direct(quota),
            calls_per_second,
            burst,
        })
    }

    /// Waits until a token is available, then consumes it.
    pub async fn acquire(&self) {
        self.inner.until_ready().await;
    }

    #[must_use]
    pub const fn calls_per_second(&self) -> u32 {
        self.calls_per_second
    }

    #[must_use]
    pub const fn burst(&self) -> u32 {
        self.burst
    }
}

impl std::fmt::Debug for ApiRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiRateLimiter")
            .field("calls_per_second", &self.calls_per_second)
            .field("burst", &self.burst)
            .finish_non_exhaustive()
    }
}

/// Bounded retry with exponential backoff.
///
/// Waits `base_delay * 2^(attempt-1)` between attempts, capped at
/// `max_delay`, and doubles the wait when the error looks like a rate-limit
/// response. Non-transient errors are returned immediately.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// Runs `op` up to `max_attempts` times.
    ///
    /// # Errors
    /// Returns the final error once attempts are exhausted, or the first
    /// non-transient error immediately.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, ConnectorError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ConnectorError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut last_err = None;

        for attempt in 1..=attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if !err.is_transient() || attempt == attempts {
                        return Err(err);
                    }

                    let mut delay = self.delay_for_attempt(attempt);
                    if err.is_rate_limited() {
                        delay = (delay * 2).min(self.max_delay);
                    }
                    tracing::warn!(
                        %label,
                        attempt,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure, retrying"
                    );
                    last_err = Some(err);
                    tokio::time::sleep(delay).await;
                }
            }
        }

        // Unreachable: the loop always returns on the final attempt.
        Err(last_err.unwrap_or_else(|| ConnectorError::Configuration("retry loop exhausted".to_string())))
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    #[tokio::test]
    async fn limiter_allows_burst_then_throttles() {
        let limiter = ApiRateLimiter::new(50, 5).unwrap();
        let start = Instant::now();

        for _ in 0..10 {
            limiter.acquire().await;
        }

        // 5 burst tokens are free; the remaining 5 refill at 50/s, so the
        // whole sequence cannot complete faster than ~100ms.
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_millis(90),
            "10 acquires finished too fast: {elapsed:?}"
        );
    }

    #[tokio::test]
    async fn limiter_burst_is_immediate() {
        let limiter = ApiRateLimiter::new(1, 5).unwrap();
        let start = Instant::now();
        for _ in 0..5 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn limiter_rejects_zero_parameters() {
        assert!(ApiRateLimiter::new(0, 5).is_err());
        assert!(ApiRateLimiter::new(5, 0).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn retry_succeeds_after_transient_failures() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);

        let result = policy
            .run("test", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(ConnectorError::Network("flaky".to_string()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_gives_up_after_max_attempts() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10), Duration::from_secs(1));
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy
            .run("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ConnectorError::Timeout("slow".to_string())) }
            })
            .await;

        assert!(matches!(result, Err(ConnectorError::Timeout(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_does_not_retry_permanent_errors() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy
            .run("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ConnectorError::CredentialInvalid("bad key".to_string())) }
            })
            .await;

        assert!(matches!(result, Err(ConnectorError::CredentialInvalid(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_errors_wait_longer() {
        // One transient rate-limit failure, then success; the virtual clock
        // must advance by at least double the base delay.
        let policy = RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(30));
        let calls = AtomicU32::new(0);
        let start = tokio::time::Instant::now();

        let result = policy
            .run("test", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(ConnectorError::RateLimited("too many requests".to_string()))
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        assert!(result.is_ok());
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[test]
    fn backoff_is_exponential_and_capped() {
        let policy = RetryPolicy::new(10, Duration::from_secs(1), Duration::from_secs(8));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(8));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(8));
    }
}
