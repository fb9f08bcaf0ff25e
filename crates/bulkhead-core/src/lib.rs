//! # Bulkhead Core
//!
//! Resilience control plane for unreliable external dependencies
//! (calendar providers, video providers, payment processor, email).
//!
//! ```text
//! bulkhead-core/src/
//! ├── store.rs        # Concurrent key→(value, expiry) table
//! ├── cache/          # Single-flight coalescing cache + sweeper
//! ├── breaker/        # Per-resource circuit breakers + registry
//! ├── idempotency/    # Reserve/confirm/release for inbound events
//! ├── alert.rs        # Fire-and-forget operational alerting
//! └── telemetry.rs    # Prometheus-style counters
//! ```
//!
//! The three primitives compose: a typical external call goes through the
//! breaker registry, wraps a coalesced cache computation, and webhook
//! dispatch brackets processing with an idempotency reservation.

#![allow(
    clippy::significant_drop_tightening,
    reason = "Lock guards in async code require careful lifetime management"
)]
// Test-only lints: allow panic!, unwrap, etc. in test code
#![cfg_attr(test, allow(clippy::panic, clippy::unwrap_used, clippy::expect_used))]

pub mod alert;
pub mod breaker;
pub mod cache;
pub mod idempotency;
pub mod store;
pub mod telemetry;

// Re-export commonly used types
pub use alert::{AlertEvent, AlertSink, LogAlertSink};
pub use breaker::{
    BreakerRegistry, BreakerStatus, CallError, CircuitBreaker, CircuitState, RegistrySummary,
    ResourceId,
};
pub use cache::CoalescingCache;
pub use idempotency::{IdempotencyGuard, IdempotencyStatus, ReserveOutcome};
pub use store::KeyedStore;

pub use bulkhead_types::{BreakerConfig, BreakerError, CacheConfig, CacheError, IdempotencyConfig};
