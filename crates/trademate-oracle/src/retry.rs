//! Exponential backoff for the forecast-engine handoff
//!
//! Only [`OracleError::is_retryable`] failures are retried; everything else is
//! returned on the first occurrence.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::OracleConfig;
use crate::error::{OracleError, Result};

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, the first one included
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Typically 2.0
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &OracleConfig) -> Self {
        if config.max_retries <= 1 {
            return Self::no_retry();
        }
        Self {
            max_attempts: config.max_retries,
            initial_backoff: config.retry_backoff_base,
            ..Self::default()
        }
    }

    /// Single attempt
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Delay before retry number `retry` (1-based)
    fn backoff_duration(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(retry - 1).unwrap_or(i32::MAX);
        let nanos =
            self.initial_backoff.as_nanos() as f64 * self.backoff_multiplier.powi(exponent);
        Duration::from_nanos(nanos.min(u64::MAX as f64) as u64).min(self.max_backoff)
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error or
    /// runs out of attempts. Returns the last error in the latter case.
    pub async fn execute<F, Fut, T>(&self, operation_name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last_error = None;

        for attempt in 0..self.max_attempts {
            debug!(
                operation = operation_name,
                attempt = attempt + 1,
                max_attempts = self.max_attempts,
                "attempting"
            );

            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(
                            operation = operation_name,
                            retries = attempt,
                            "succeeded after retries"
                        );
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    if attempt + 1 < self.max_attempts {
                        let backoff = self.backoff_duration(attempt + 1);
                        warn!(
                            operation = operation_name,
                            attempt = attempt + 1,
                            error = %e,
                            backoff_ms = backoff.as_millis() as u64,
                            "retryable failure, backing off"
                        );
                        sleep(backoff).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            OracleError::Other(format!("{operation_name} was never attempted"))
        }))
    }
}
