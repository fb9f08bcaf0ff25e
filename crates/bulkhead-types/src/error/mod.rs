//! Typed error definitions for the bulkhead resilience plane.
//!
//! This module provides a structured error hierarchy with specific error
//! types for each primitive. All errors are designed to be:
//!
//! - **Serializable** for API responses via serde
//! - **Displayable** for logging via Display trait
//! - **Matchable** for error handling logic via enum variants
//! - **Composable** via thiserror derive macros

mod breaker;
mod cache;

pub use breaker::BreakerError;
pub use cache::CacheError;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type that wraps all domain-specific errors.
///
/// Use this when you need a single error type that can represent
/// any resilience-plane error.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "domain", content = "error")]
pub enum TypedError {
    /// Wraps a circuit breaker error
    #[error("Breaker error: {0}")]
    Breaker(#[from] BreakerError),

    /// Wraps a coalescing cache error
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

/// Standard Result type using TypedError.
pub type Result<T> = std::result::Result<T, TypedError>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serialization() {
        let err = TypedError::Breaker(BreakerError::NotFound {
            resource: "calendar/google".to_string(),
        });

        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("Breaker"));
        assert!(json.contains("calendar/google"));

        let deserialized: TypedError = serde_json::from_str(&json).unwrap();
        assert_eq!(err, deserialized);
    }

    #[test]
    fn test_error_display() {
        let err = BreakerError::CircuitOpen {
            resource: "payments".to_string(),
            retry_after_secs: Some(90),
        };

        let msg = format!("{}", err);
        assert!(msg.contains("payments"));
        assert!(msg.contains("90"));
    }
}
