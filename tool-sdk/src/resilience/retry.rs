//! Retry with exponential backoff and a per-attempt deadline.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use backoff::{backoff::Backoff, ExponentialBackoff};
use tracing::warn;

use crate::error::{Result, ServiceError};

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 means a single attempt)
    pub max_retries: u32,

    pub initial_interval: Duration,

    pub max_interval: Duration,

    pub multiplier: f64,

    pub randomization_factor: f64,

    /// Deadline for each individual attempt
    pub attempt_timeout: Option<Duration>,

    /// Total time budget across all attempts and waits
    pub max_elapsed_time: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_interval: Duration::from_millis(200),
            max_interval: Duration::from_secs(5),
            multiplier: 2.0,
            randomization_factor: 0.2,
            attempt_timeout: Some(Duration::from_secs(10)),
            max_elapsed_time: Some(Duration::from_secs(60)),
        }
    }
}

impl fmt::Display for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "retries={} initial={:?} max={:?} x{} attempt_timeout={:?}",
            self.max_retries,
            self.initial_interval,
            self.max_interval,
            self.multiplier,
            self.attempt_timeout
        )
    }
}

#[derive(Debug, Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.config.initial_interval,
            initial_interval: self.config.initial_interval,
            max_interval: self.config.max_interval,
            multiplier: self.config.multiplier,
            randomization_factor: self.config.randomization_factor,
            max_elapsed_time: self.config.max_elapsed_time,
            ..ExponentialBackoff::default()
        }
    }

    /// Run `operation` until it succeeds, fails permanently, or the retry
    /// budget is spent. Each attempt is bounded by `attempt_timeout`.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut backoff = self.backoff();
        let mut retries = 0u32;

        loop {
            let result = match self.config.attempt_timeout {
                Some(limit) => match tokio::time::timeout(limit, operation()).await {
                    Ok(result) => result,
                    Err(_) => Err(ServiceError::timeout(format!(
                        "attempt exceeded {}ms",
                        limit.as_millis()
                    ))),
                },
                None => operation().await,
            };

            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            // an open circuit rejects every further attempt until it resets
            let circuit_open = matches!(err.root(), ServiceError::CircuitBroken(_));
            if !err.is_retryable() || circuit_open || retries >= self.config.max_retries {
                return Err(err.with_context_value("attempts", retries + 1));
            }

            let Some(wait) = backoff.next_backoff() else {
                return Err(err.with_context_value("attempts", retries + 1));
            };

            retries += 1;
            warn!(
                error = %err,
                retry = retries,
                max_retries = self.config.max_retries,
                wait_ms = wait.as_millis() as u64,
                "transient failure, backing off"
            );
            tokio::time::sleep(wait).await;
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn quick(max_retries: u32) -> RetryExecutor {
        RetryExecutor::new(RetryConfig {
            max_retries,
            initial_interval: Duration::from_millis(5),
            max_interval: Duration::from_millis(20),
            attempt_timeout: Some(Duration::from_millis(50)),
            ..RetryConfig::default()
        })
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);

        let result = quick(2)
            .execute(|| {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(ServiceError::network("flaky"))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let attempts = AtomicUsize::new(0);

        let result: Result<()> = quick(3)
            .execute(|| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(ServiceError::authentication("bad key")) }
            })
            .await;

        assert!(matches!(result.unwrap_err().root(), ServiceError::Authentication(_)));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_attempts() {
        let result: Result<()> = quick(2)
            .execute(|| async { Err(ServiceError::external_service("503")) })
            .await;

        let err = result.unwrap_err();
        let attempts = err.context().and_then(|c| c.data.get("attempts").cloned());
        assert_eq!(attempts.as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn test_broken_circuit_stops_the_loop() {
        let attempts = AtomicUsize::new(0);

        let result: Result<()> = quick(3)
            .execute(|| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(ServiceError::circuit_broken("open")) }
            })
            .await;

        assert!(matches!(result.unwrap_err().root(), ServiceError::CircuitBroken(_)));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slow_attempt_times_out() {
        let result: Result<()> = quick(0)
            .execute(|| async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result.unwrap_err().root(), ServiceError::Timeout(_)));
    }
}
