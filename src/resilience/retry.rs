//! Retry policy with bounded exponential backoff
//!
//! Wraps a fallible async operation and retries it on transient failure.
//! The policy only spends budget on errors the error type itself classifies
//! as retryable; request-construction bugs (4xx, malformed payloads)
//! propagate immediately.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;

/// Classification contract the retry policy relies on.
///
/// Implemented by the domain error types so the retryable/non-retryable
/// decision lives with the error, not at each call site.
pub trait Retryable {
    /// Whether another attempt could plausibly succeed
    fn is_retryable(&self) -> bool;

    /// Server-suggested wait before the next attempt (e.g. `Retry-After`)
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl Retryable for crate::domain::SisError {
    fn is_retryable(&self) -> bool {
        crate::domain::SisError::is_retryable(self)
    }

    fn retry_after(&self) -> Option<Duration> {
        crate::domain::SisError::retry_after(self)
    }
}

impl Retryable for crate::domain::RollcallError {
    fn is_retryable(&self) -> bool {
        crate::domain::RollcallError::is_retryable(self)
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Sis(e) => e.retry_after(),
            _ => None,
        }
    }
}

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Ceiling on the backoff delay
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each failed attempt
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Fast retry for tests (minimal delays)
    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            backoff_multiplier: 2.0,
        }
    }
}

/// Error returned when the policy gives up
///
/// Tags the last underlying error with the total number of attempts made,
/// so callers can report "failed after N attempts" without re-counting.
#[derive(Debug, Error)]
#[error("operation failed after {attempts} attempt(s): {source}")]
pub struct RetryError<E: std::error::Error> {
    /// Total attempts made, including the initial one
    pub attempts: u32,
    /// The last error observed
    #[source]
    pub source: E,
}

/// Retry policy executor
///
/// One policy instance is shared across an operation; the cumulative retry
/// counter it keeps feeds the final sync report.
#[derive(Debug)]
pub struct RetryPolicy {
    config: RetryConfig,
    retries_total: AtomicU64,
}

impl RetryPolicy {
    /// Create a new retry policy
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            retries_total: AtomicU64::new(0),
        }
    }

    /// The configured attempt ceiling (initial attempt + retries)
    pub fn max_attempts(&self) -> u32 {
        self.config.max_retries + 1
    }

    /// Cumulative retries performed through this policy instance
    pub fn retries_total(&self) -> u64 {
        self.retries_total.load(Ordering::Relaxed)
    }

    /// Delay before retry number `retry` (1-based):
    /// `min(initial_delay * multiplier^(retry-1), max_delay)`
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let factor = self.config.backoff_multiplier.powi(retry.saturating_sub(1) as i32);
        let delay = self.config.initial_delay.mul_f64(factor);
        delay.min(self.config.max_delay)
    }

    /// Execute `operation`, retrying retryable failures with backoff.
    ///
    /// The first attempt runs immediately. A permanently failing retryable
    /// operation is invoked exactly `max_retries + 1` times. Non-retryable
    /// errors propagate on the attempt they occur, without consuming budget;
    /// the returned [`RetryError`] then reports the attempts actually made.
    pub async fn execute<F, Fut, T, E>(
        &self,
        operation_name: &str,
        mut operation: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + std::error::Error,
    {
        let mut attempt: u32 = 1;

        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(
                            operation = operation_name,
                            attempts = attempt,
                            "Operation succeeded after retries"
                        );
                    }
                    return Ok(value);
                }
                Err(err) => {
                    let retryable = err.is_retryable();

                    if !retryable || attempt >= self.max_attempts() {
                        if retryable {
                            tracing::error!(
                                operation = operation_name,
                                attempts = attempt,
                                error = %err,
                                "Retry budget exhausted"
                            );
                        } else {
                            tracing::error!(
                                operation = operation_name,
                                attempt = attempt,
                                error = %err,
                                "Non-retryable error, giving up"
                            );
                        }
                        return Err(RetryError {
                            attempts: attempt,
                            source: err,
                        });
                    }

                    // Honor a server-provided Retry-After over the computed
                    // backoff when it is longer.
                    let backoff = self.delay_for_retry(attempt);
                    let delay = match err.retry_after() {
                        Some(hint) if hint > backoff => hint.min(self.config.max_delay),
                        _ => backoff,
                    };

                    tracing::warn!(
                        operation = operation_name,
                        attempt = attempt,
                        max_attempts = self.max_attempts(),
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Retrying operation after error"
                    );

                    self.retries_total.fetch_add(1, Ordering::Relaxed);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
