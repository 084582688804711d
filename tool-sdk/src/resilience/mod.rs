//! Resilience patterns for capability calls
//!
//! - Retry with exponential backoff and a per-attempt timeout
//! - Circuit breaker per capability
//! - A facade composing both around a single primary call

mod circuit_breaker;
mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
pub use retry::{RetryConfig, RetryExecutor};

use std::future::Future;
use std::sync::Arc;

use crate::error::Result;

/// Retry and circuit breaker applied together to one capability.
#[derive(Debug, Clone)]
pub struct Resilience {
    retry: RetryExecutor,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl Resilience {
    pub fn new(
        name: impl Into<String>,
        retry_config: RetryConfig,
        circuit_breaker_config: CircuitBreakerConfig,
    ) -> Self {
        Self {
            retry: RetryExecutor::new(retry_config),
            circuit_breaker: Arc::new(CircuitBreaker::new(name, circuit_breaker_config)),
        }
    }

    /// Execute `operation` behind the circuit breaker with retries.
    ///
    /// The breaker is consulted before every attempt, so a circuit that
    /// opens mid-loop stops the remaining retries with `CircuitBroken`.
    /// Transient failures and abandoned (timed-out) attempts count against
    /// the breaker; permanent errors only release the admission.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let cb = &self.circuit_breaker;
        self.retry
            .execute(|| {
                let admitted = cb.check().map(|()| (AttemptGuard::new(cb), operation()));
                async move {
                    let (mut guard, attempt) = admitted?;
                    let result = attempt.await;
                    guard.settle(&result);
                    result
                }
            })
            .await
    }

    pub fn circuit_breaker_status(&self) -> CircuitBreakerStatus {
        self.circuit_breaker.status()
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.circuit_breaker
    }

    pub fn retry_config(&self) -> &RetryConfig {
        self.retry.config()
    }
}

/// Outcome bookkeeping for one admitted attempt.
///
/// Dropping an unsettled guard means the attempt future was abandoned,
/// which the breaker treats as a failure.
struct AttemptGuard<'a> {
    breaker: &'a CircuitBreaker,
    settled: bool,
}

impl<'a> AttemptGuard<'a> {
    fn new(breaker: &'a CircuitBreaker) -> Self {
        Self {
            breaker,
            settled: false,
        }
    }

    fn settle<T>(&mut self, result: &Result<T>) {
        self.settled = true;
        match result {
            Ok(_) => self.breaker.record_success(),
            Err(err) if err.is_retryable() => self.breaker.record_failure(),
            Err(_) => self.breaker.release(),
        }
    }
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.record_failure();
        }
    }
}

/// Status of a circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitBreakerStatus {
    /// Requests flow to the primary
    Closed,

    /// Primary is skipped
    Open,

    /// One trial request is allowed through
    HalfOpen,
}

impl std::fmt::Display for CircuitBreakerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}
