//! Circuit breaker state types.

use bulkhead_types::BreakerConfig;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// State of the circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation - calls pass through
    Closed,
    /// Resource is failing - calls fail immediately
    Open,
    /// Testing recovery - limited trial calls allowed
    HalfOpen,
}

impl CircuitState {
    pub(crate) fn as_label(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// Mutable breaker state, owned by exactly one [`super::CircuitBreaker`]
/// and serialized behind its mutex.
#[derive(Debug)]
pub(crate) struct BreakerState {
    pub state: CircuitState,
    /// Failures within the current window
    pub failure_count: u32,
    /// Successes within the current window
    pub success_count: u32,
    /// Anchor of the current counting window
    pub window_start: Instant,
    /// Most recent failure; gates the Open → HalfOpen transition
    pub last_failure: Option<Instant>,
    /// Trial calls admitted while half-open
    pub half_open_attempts: u32,
}

impl BreakerState {
    pub fn new(now: Instant) -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            window_start: now,
            last_failure: None,
            half_open_attempts: 0,
        }
    }

    /// Lazy window rollover: counters reset on the next call after the
    /// window elapses, never on a timer. An idle resource keeps its window
    /// frozen.
    pub fn maybe_reset_window(&mut self, now: Instant, window: Duration) {
        if now.duration_since(self.window_start) >= window {
            self.failure_count = 0;
            self.success_count = 0;
            self.window_start = now;
        }
    }

    /// Transition to Closed with fresh counters.
    pub fn close(&mut self, now: Instant) {
        self.state = CircuitState::Closed;
        self.failure_count = 0;
        self.success_count = 0;
        self.window_start = now;
        self.last_failure = None;
        self.half_open_attempts = 0;
    }
}

/// Point-in-time view of a breaker, safe to hand to dashboards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerStatus {
    pub resource: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub half_open_attempts: u32,
    pub config: BreakerConfig,
}

/// Aggregate view across a registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySummary {
    pub closed: usize,
    pub open: usize,
    pub half_open: usize,
}
