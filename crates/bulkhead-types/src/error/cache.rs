//! Coalescing-cache errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by the request-coalescing cache.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum CacheError {
    /// The leader's computation failed or panicked. Every waiter for the
    /// key receives this uniformly; the failure is never cached.
    #[error("Computation failed for {key}: {message}")]
    ComputationFailed { key: String, message: String },

    /// Gave up waiting on an in-flight computation. The computation may
    /// still complete for other waiters.
    #[error("Timed out waiting for in-flight computation for {key}")]
    WaitTimeout { key: String },
}

impl CacheError {
    /// The key the operation was for.
    pub fn key(&self) -> &str {
        match self {
            Self::ComputationFailed { key, .. } | Self::WaitTimeout { key } => key,
        }
    }
}
