//! Circuit breakers for fast-fail behavior toward unreliable dependencies.
//!
//! Each external resource gets its own breaker. Failures are counted inside
//! a sliding window; when the count reaches the threshold the circuit opens
//! and calls fail immediately. After the recovery timeout a bounded number
//! of trial calls probe the resource, and a successful probe run closes the
//! circuit again.
//!
//! States:
//! - Closed: normal operation, calls pass through
//! - Open: resource is failing, calls fail immediately
//! - HalfOpen: testing if the resource has recovered
//!
//! The breaker decides allow/deny and records outcomes; it never retries.
//! Retry policy is the caller's concern.

mod registry;
mod state;


pub use registry::{BreakerRegistry, ResourceId};
pub use state::{BreakerStatus, CircuitState, RegistrySummary};

use state::BreakerState;

use crate::alert::{notify_guarded, AlertEvent, AlertSink};
use crate::telemetry::record_breaker_transition;
use bulkhead_types::{BreakerConfig, BreakerError};
use futures::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Error returned by [`CircuitBreaker::call`]: either the breaker's own
/// rejection or the wrapped function's error, preserved with its type.
#[derive(Debug, thiserror::Error)]
pub enum CallError<E> {
    /// The breaker rejected or classified the call itself
    #[error(transparent)]
    Breaker(#[from] BreakerError),
    /// The wrapped call ran and returned its own error
    #[error("{0}")]
    Inner(E),
}

impl<E> CallError<E> {
    /// True when the call was rejected without invoking the function.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Breaker(err) if err.is_rejection())
    }
}

/// A single resource's circuit breaker.
///
/// Transitions are serialized through the state mutex, so they are
/// total-ordered per resource; the lock is never held across an await,
/// and breakers for different resources share nothing.
pub struct CircuitBreaker {
    resource: String,
    config: BreakerConfig,
    state: Mutex<BreakerState>,
    alerts: Option<Arc<dyn AlertSink>>,
}

impl CircuitBreaker {
    pub fn new(resource: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            resource: resource.into(),
            config,
            state: Mutex::new(BreakerState::new(Instant::now())),
            alerts: None,
        }
    }

    /// Attach an alert sink notified on open/half-open/close transitions.
    pub fn with_alert_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.alerts = Some(sink);
        self
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Execute `f` under the breaker.
    ///
    /// `Ok` counts as a success, `Err` as a failure, and a panic is caught
    /// and counted as a failure - it never unwinds past the breaker. When
    /// the circuit is open the call is rejected with `CircuitOpen` without
    /// invoking `f`.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.admit(Instant::now())?;

        match AssertUnwindSafe(f()).catch_unwind().await {
            Ok(Ok(value)) => {
                self.record_success();
                Ok(value)
            },
            Ok(Err(err)) => {
                self.record_failure();
                Err(CallError::Inner(err))
            },
            Err(_) => {
                self.record_failure();
                Err(CallError::Breaker(BreakerError::CallPanicked {
                    resource: self.resource.clone(),
                }))
            },
        }
    }

    /// Like [`call`](Self::call), with a caller-supplied time limit on the
    /// wrapped call. A timeout counts as a failure. Aborting the underlying
    /// I/O after the timeout remains the caller's responsibility.
    pub async fn call_with_timeout<F, Fut, T, E>(
        &self,
        limit: Duration,
        f: F,
    ) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.admit(Instant::now())?;

        match tokio::time::timeout(limit, AssertUnwindSafe(f()).catch_unwind()).await {
            Ok(Ok(Ok(value))) => {
                self.record_success();
                Ok(value)
            },
            Ok(Ok(Err(err))) => {
                self.record_failure();
                Err(CallError::Inner(err))
            },
            Ok(Err(_)) => {
                self.record_failure();
                Err(CallError::Breaker(BreakerError::CallPanicked {
                    resource: self.resource.clone(),
                }))
            },
            Err(_) => {
                self.record_failure();
                Err(CallError::Breaker(BreakerError::CallTimeout {
                    resource: self.resource.clone(),
                    limit_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                }))
            },
        }
    }

    /// Decide whether a call may proceed, applying any due transition.
    fn admit(&self, now: Instant) -> Result<(), BreakerError> {
        let mut state = self.state.lock();

        match state.state {
            CircuitState::Closed => {
                state.maybe_reset_window(now, self.config.time_window);
                Ok(())
            },
            CircuitState::Open => {
                let elapsed = state.last_failure.map(|at| now.duration_since(at));
                // Boundary is inclusive: a call at exactly the recovery
                // timeout is admitted as the first trial.
                if elapsed.is_some_and(|e| e >= self.config.recovery_timeout) {
                    debug!(resource = %self.resource, "circuit breaker transitioning to half-open");
                    state.state = CircuitState::HalfOpen;
                    state.half_open_attempts = 1;
                    state.success_count = 0;
                    drop(state);
                    self.on_transition(CircuitState::HalfOpen, 0);
                    return Ok(());
                }
                let retry_after_secs = elapsed
                    .map(|e| self.config.recovery_timeout.saturating_sub(e))
                    .map(|remaining| remaining.as_secs().max(1));
                Err(BreakerError::CircuitOpen { resource: self.resource.clone(), retry_after_secs })
            },
            CircuitState::HalfOpen => {
                if state.half_open_attempts < self.config.half_open_requests {
                    state.half_open_attempts += 1;
                    Ok(())
                } else {
                    // Trial budget spent without enough successes; go back
                    // to Open and restart the recovery timer from now.
                    warn!(
                        resource = %self.resource,
                        attempts = state.half_open_attempts,
                        "half-open trial budget exhausted, re-opening"
                    );
                    state.state = CircuitState::Open;
                    state.last_failure = Some(now);
                    let failures = state.failure_count;
                    drop(state);
                    self.on_transition(CircuitState::Open, failures);
                    Err(BreakerError::CircuitOpen {
                        resource: self.resource.clone(),
                        retry_after_secs: Some(self.config.recovery_timeout.as_secs().max(1)),
                    })
                }
            },
        }
    }

    fn record_success(&self) {
        let now = Instant::now();
        let mut state = self.state.lock();

        match state.state {
            CircuitState::Closed => {
                state.maybe_reset_window(now, self.config.time_window);
                state.success_count += 1;
            },
            CircuitState::HalfOpen => {
                state.success_count += 1;
                if state.half_open_attempts >= self.config.half_open_requests {
                    info!(resource = %self.resource, "circuit breaker closing - resource recovered");
                    state.close(now);
                    state.success_count = 1;
                    drop(state);
                    self.on_transition(CircuitState::Closed, 0);
                }
            },
            CircuitState::Open => {
                // An in-flight call admitted before the trip can land here.
                debug!(resource = %self.resource, "success recorded while open");
            },
        }
    }

    fn record_failure(&self) {
        let now = Instant::now();
        let mut state = self.state.lock();

        match state.state {
            CircuitState::Closed => {
                state.maybe_reset_window(now, self.config.time_window);
                state.failure_count += 1;
                state.last_failure = Some(now);
                if state.failure_count >= self.config.failure_threshold {
                    let failures = state.failure_count;
                    warn!(
                        resource = %self.resource,
                        failures,
                        "circuit breaker opening - too many failures"
                    );
                    state.state = CircuitState::Open;
                    drop(state);
                    self.on_transition(CircuitState::Open, failures);
                }
            },
            CircuitState::HalfOpen => {
                warn!(resource = %self.resource, "circuit breaker re-opening - trial call failed");
                state.state = CircuitState::Open;
                state.last_failure = Some(now);
                let failures = state.failure_count;
                drop(state);
                self.on_transition(CircuitState::Open, failures);
            },
            CircuitState::Open => {},
        }
    }

    fn on_transition(&self, to: CircuitState, failures: u32) {
        record_breaker_transition(&self.resource, to.as_label());
        if let Some(sink) = &self.alerts {
            let event = match to {
                CircuitState::Open => {
                    AlertEvent::BreakerOpened { resource: self.resource.clone(), failures }
                },
                CircuitState::HalfOpen => {
                    AlertEvent::BreakerHalfOpen { resource: self.resource.clone() }
                },
                CircuitState::Closed => {
                    AlertEvent::BreakerClosed { resource: self.resource.clone() }
                },
            };
            notify_guarded(sink.as_ref(), event);
        }
    }

    pub fn current_state(&self) -> CircuitState {
        self.state.lock().state
    }

    pub fn status(&self) -> BreakerStatus {
        let state = self.state.lock();
        BreakerStatus {
            resource: self.resource.clone(),
            state: state.state,
            failure_count: state.failure_count,
            success_count: state.success_count,
            half_open_attempts: state.half_open_attempts,
            config: self.config.clone(),
        }
    }

    /// Return to Closed with zeroed counters, regardless of prior state.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        let previous = state.state;
        state.close(Instant::now());
        drop(state);
        if previous != CircuitState::Closed {
            info!(resource = %self.resource, previous = ?previous, "circuit breaker reset manually");
            self.on_transition(CircuitState::Closed, 0);
        }
    }
}
