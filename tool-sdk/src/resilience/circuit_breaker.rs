//! Per-capability circuit breaker.
//!
//! A breaker trips after a run of consecutive transient failures. While open,
//! callers skip the primary endpoint entirely; after `reset_timeout` the next
//! caller is let through as a trial call (half-open). Only one trial call is in flight
//! at a time and enough trial-call successes close the circuit again.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::CircuitBreakerStatus;
use crate::error::{Result, ServiceError};

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: usize,

    /// How long the circuit stays open before a trial call is allowed
    pub reset_timeout: Duration,

    /// Trial-call successes needed to close a half-open circuit
    pub success_threshold: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            success_threshold: 1,
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    status: CircuitBreakerStatus,
    opened_at: Option<Instant>,
    consecutive_failures: usize,
    trial_successes: usize,
    trial_in_flight: bool,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: Mutex::new(BreakerState {
                status: CircuitBreakerStatus::Closed,
                opened_at: None,
                consecutive_failures: 0,
                trial_successes: 0,
                trial_in_flight: false,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Admit one call, or return `CircuitBroken`.
    ///
    /// While half-open exactly one caller holds the trial slot; everyone else is
    /// rejected until that call settles.
    pub fn check(&self) -> Result<()> {
        let mut state = self.state();
        match state.status {
            CircuitBreakerStatus::Closed => Ok(()),
            CircuitBreakerStatus::HalfOpen if state.trial_in_flight => {
                Err(ServiceError::circuit_broken(format!(
                    "circuit for '{}' is half-open with a trial call in flight",
                    self.name
                )))
            }
            CircuitBreakerStatus::HalfOpen => {
                state.trial_in_flight = true;
                Ok(())
            }
            CircuitBreakerStatus::Open => {
                let elapsed = state.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.config.reset_timeout {
                    info!(capability = %self.name, "circuit half-open, allowing a trial call");
                    state.status = CircuitBreakerStatus::HalfOpen;
                    state.trial_successes = 0;
                    state.trial_in_flight = true;
                    return Ok(());
                }

                let remaining = self.config.reset_timeout.saturating_sub(elapsed);
                Err(ServiceError::circuit_broken(format!(
                    "circuit for '{}' open for another {}ms",
                    self.name,
                    remaining.as_millis()
                )))
            }
        }
    }

    /// Settle an admitted call that says nothing about availability
    /// (a permanent error), freeing the trial call slot.
    pub fn release(&self) {
        self.state().trial_in_flight = false;
    }

    pub fn record_success(&self) {
        let mut state = self.state();
        match state.status {
            CircuitBreakerStatus::Closed => state.consecutive_failures = 0,
            CircuitBreakerStatus::HalfOpen => {
                state.trial_in_flight = false;
                state.trial_successes += 1;
                if state.trial_successes >= self.config.success_threshold {
                    info!(capability = %self.name, "circuit closed");
                    state.status = CircuitBreakerStatus::Closed;
                    state.opened_at = None;
                    state.consecutive_failures = 0;
                    state.trial_successes = 0;
                }
            }
            CircuitBreakerStatus::Open => {
                debug!(capability = %self.name, "late success while open, ignored");
            }
        }
    }

    pub fn record_failure(&self) {
        let mut state = self.state();
        match state.status {
            CircuitBreakerStatus::Closed => {
                state.consecutive_failures += 1;
                if state.consecutive_failures >= self.config.failure_threshold {
                    warn!(
                        capability = %self.name,
                        failures = state.consecutive_failures,
                        "circuit opened"
                    );
                    Self::open(&mut state);
                }
            }
            CircuitBreakerStatus::HalfOpen => {
                warn!(capability = %self.name, "trial call failed, circuit reopened");
                Self::open(&mut state);
            }
            CircuitBreakerStatus::Open => {}
        }
    }

    fn open(state: &mut BreakerState) {
        state.status = CircuitBreakerStatus::Open;
        state.opened_at = Some(Instant::now());
        state.trial_successes = 0;
        state.trial_in_flight = false;
    }

    pub fn reset(&self) {
        let mut state = self.state();
        state.status = CircuitBreakerStatus::Closed;
        state.opened_at = None;
        state.consecutive_failures = 0;
        state.trial_successes = 0;
        state.trial_in_flight = false;
    }

    pub fn status(&self) -> CircuitBreakerStatus {
        self.state().status
    }

    pub fn failure_count(&self) -> usize {
        self.state().consecutive_failures
    }
}
