//! Bounded retry with exponential backoff around one processing cycle.

use std::future::Future;
use std::time::Duration;

use crate::error::WalkerError;

/// Configuration for the retry policy.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not counting the first try).
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Maximum backoff delay (caps exponential growth).
    pub max_backoff: Duration,
    /// Multiplier applied to backoff on each retry.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

/// Retry policy used by `walk`. Listen relies on the next tick instead.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Returns the delay before the `attempt`-th retry (1-based).
    /// Returns `None` if `attempt` exceeds `max_retries`.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt > self.config.max_retries {
            return None;
        }
        let base_ms = self.config.initial_backoff.as_millis() as f64
            * self.config.multiplier.powi(attempt.saturating_sub(1) as i32);
        let cap_ms = self.config.max_backoff.as_millis() as f64;
        Some(Duration::from_millis(base_ms.min(cap_ms) as u64))
    }

    /// Retries left after `attempt` failed attempts.
    pub fn retries_left(&self, attempt: u32) -> u32 {
        (self.config.max_retries + 1).saturating_sub(attempt)
    }

    /// Run `operation` until it succeeds, a non-retryable error occurs, or
    /// retries are exhausted. The last error is returned unchanged.
    ///
    /// `operation` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, WalkerError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, WalkerError>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let err = match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            if !err.is_retryable() {
                return Err(err);
            }

            let retries_left = self.retries_left(attempt);
            tracing::warn!(
                attempt,
                retries_left,
                error = %err,
                "Attempt {attempt} failed. There are {retries_left} retries left."
            );
            match self.next_delay(attempt) {
                Some(delay) => tokio::time::sleep(delay).await,
                None => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}
