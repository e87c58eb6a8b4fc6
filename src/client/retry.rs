//! Retry with exponential backoff and jitter.
//!
//! Epistemic foundation:
//! - K_i: Only errors marked retryable are retried
//! - K_i: Delay grows as base × factor^(attempt-1), capped at max_delay
//! - I^B: Many clients failing together → random jitter spreads the retries
//!
//! Each call to [`with_retry`] owns its attempt counter; nothing is shared
//! between concurrent invocations.

use crate::models::Result;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Retry configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Cap on the un-jittered delay
    pub max_delay: Duration,
    /// Growth factor between retries
    pub backoff_factor: f64,
    /// Jitter is drawn uniformly from `[0, max_jitter)`
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(10_000),
            backoff_factor: 2.0,
            max_jitter: Duration::from_millis(1_000),
        }
    }
}

impl RetryPolicy {
    /// Policy used for autocomplete lookups.
    pub fn suggestions() -> Self {
        Self {
            max_delay: Duration::from_millis(5_000),
            ..Self::default()
        }
    }

    /// Un-jittered delay after the given (1-indexed) failed attempt.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.max_delay)
    }

    /// Random extra delay in `[0, max_jitter)`.
    pub fn jitter(&self) -> Duration {
        if self.max_jitter.is_zero() {
            return Duration::ZERO;
        }
        let fraction: f64 = rand::rng().random();
        self.max_jitter.mul_f64(fraction)
    }
}

/// Run `operation` until it succeeds, fails permanently, or runs out of attempts.
///
/// - non-retryable failure → returned immediately
/// - failure on the final attempt → returned as-is
/// - otherwise sleep `backoff_delay(attempt) + jitter()` and try again
pub async fn with_retry<F, Fut, T>(mut operation: F, policy: &RetryPolicy) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt: u32 = 1;

    loop {
        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if !error.is_retryable() || attempt >= max_attempts {
            return Err(error);
        }

        let delay = policy.backoff_delay(attempt) + policy.jitter();
        debug!(
            attempt = attempt,
            max_attempts = max_attempts,
            kind = %error.kind(),
            delay_ms = delay.as_millis() as u64,
            "Retrying after transient error"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
