//! # Bulkhead Types
//!
//! Shared types for the bulkhead resilience plane.
//!
//! This crate sits at the bottom of the dependency graph and provides:
//!
//! - **`error`** - Typed error hierarchy for breakers and the coalescing cache
//! - **`config`** - Configuration structs for all resilience primitives
//!
//! All types are designed to be:
//! - **Serializable** via serde for API/IPC
//! - **Clone** for cheap sharing across async boundaries
//! - **PartialEq** for testing and comparison

pub mod config;
pub mod error;

// Re-export error types for convenience
pub use error::{BreakerError, CacheError, Result, TypedError};

// Re-export configuration types
pub use config::{BreakerConfig, CacheConfig, IdempotencyConfig};
