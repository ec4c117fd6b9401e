//! Bounded retry with exponential backoff
//!
//! Only [`CorpusError::Transient`] failures are retried. Every attempt runs
//! under its own deadline; running past it counts as a transient failure.

use crate::error::CorpusError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Retry settings for corpus calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub base_delay: Duration,
    /// Upper bound on the computed delay, before jitter
    pub max_delay: Duration,
    /// Deadline for a single attempt
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            attempt_timeout: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no backoff
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Set the attempt ceiling (at least one)
    #[inline]
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Set base and maximum backoff delay
    #[inline]
    #[must_use]
    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.base_delay = base;
        self.max_delay = max.max(base);
        self
    }

    /// Set the per-attempt deadline
    #[inline]
    #[must_use]
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Delay before attempt `attempt + 1`, without jitter
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails permanently or attempts run out
    ///
    /// Returns the value and the number of attempts used.
    ///
    /// # Errors
    /// The last error seen.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<(T, u32), CorpusError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, CorpusError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = match tokio::time::timeout(self.attempt_timeout, op(attempt)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(CorpusError::Transient(format!(
                    "{operation} exceeded {}ms attempt deadline",
                    self.attempt_timeout.as_millis()
                ))),
            };

            match outcome {
                Ok(value) => return Ok((value, attempt)),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.backoff(attempt) + jitter(self.backoff(attempt));
                    tracing::warn!(
                        operation,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient corpus failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    tracing::warn!(operation, attempt, error = %e, "corpus call failed");
                    return Err(e);
                }
            }
        }
    }
}

/// Up to half of `delay`, uniformly distributed
fn jitter(delay: Duration) -> Duration {
    let cap = u64::try_from(delay.as_millis() / 2).unwrap_or(u64::MAX);
    if cap == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=cap))
}
