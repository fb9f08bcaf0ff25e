//! Circuit-breaker errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by a circuit breaker or the breaker registry.
///
/// These cover the breaker's own rejections; the wrapped call's error is
/// returned separately so the caller keeps its original type.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum BreakerError {
    /// The circuit is open (too many failures); call rejected without
    /// invoking the wrapped function
    #[error("Circuit open for {resource}{}", retry_after_secs.map(|s| format!(", retry after {}s", s)).unwrap_or_default())]
    CircuitOpen {
        /// Resource identifier the breaker guards
        resource: String,
        /// Seconds until a trial call will be admitted, if known
        retry_after_secs: Option<u64>,
    },

    /// No breaker is registered for this resource. Surfaced instead of
    /// running the call unprotected.
    #[error("No circuit breaker registered for {resource}")]
    NotFound {
        /// Resource identifier that was looked up
        resource: String,
    },

    /// The wrapped call exceeded the caller-supplied time limit
    #[error("Call to {resource} timed out after {limit_ms}ms")]
    CallTimeout { resource: String, limit_ms: u64 },

    /// The wrapped call panicked; the panic was caught and recorded
    /// as a failure rather than unwinding through the breaker
    #[error("Call to {resource} panicked")]
    CallPanicked { resource: String },
}

impl BreakerError {
    /// Check if this is a transient rejection the caller may retry later.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// Check if this is a configuration/lifecycle error (a bug in the
    /// embedding application, not a dependency failure).
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
