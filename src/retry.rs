//! Bounded exponential backoff for idempotent remote calls
//!
//! An operation is attempted up to `max_attempts` times. After failed attempt
//! `n` (zero based) the engine sleeps `initial_delay * 2^n` before trying
//! again, so the default policy waits 1s then 2s. The last error is returned
//! unchanged.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// Errors that report whether another attempt could succeed
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// How many times to try and how long to wait in between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles after each failure
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the failed attempt with index `attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.initial_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Runs `operation` under `policy`
///
/// Errors for which `is_retryable` is false are returned immediately.
pub async fn retry<T, E, F, Fut>(policy: RetryPolicy, mut operation: F) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let remaining = attempt + 1 < max_attempts;
                if !remaining || !err.is_retryable() {
                    debug!(attempt = attempt + 1, error = %err, "giving up");
                    return Err(err);
                }

                let delay = policy.delay_for(attempt);
                warn!(
                    attempt = attempt + 1,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "attempt failed, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
