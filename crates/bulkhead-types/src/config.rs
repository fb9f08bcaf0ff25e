//! Configuration for the resilience primitives.
//!
//! Each primitive takes a plain config struct with a sensible `Default`.
//! Durations serialize via serde's standard `{secs, nanos}` encoding.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Circuit breaker configuration.
///
/// Failure counting happens inside a sliding window: `failure_threshold`
/// failures within `time_window` trip the breaker. The window resets lazily
/// on the next call after it elapses, never on a timer, so an idle resource
/// keeps its counters frozen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Number of failures within the window before opening the circuit
    pub failure_threshold: u32,
    /// Length of the failure-counting window
    pub time_window: Duration,
    /// Duration to keep the circuit open before admitting a trial call
    pub recovery_timeout: Duration,
    /// Number of trial calls admitted in the half-open state
    pub half_open_requests: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            time_window: Duration::from_secs(60),
            recovery_timeout: Duration::from_secs(120),
            half_open_requests: 2,
        }
    }
}

/// Coalescing cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// How long a waiter blocks on an in-flight computation before giving up
    pub wait_timeout: Duration,
    /// Interval for the advisory background sweep of expired entries
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { wait_timeout: Duration::from_secs(30), sweep_interval: Duration::from_secs(60) }
    }
}

/// Idempotency guard configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyConfig {
    /// TTL of a `Reserved` record; a reservation older than this is
    /// considered abandoned (crashed worker) and may be retaken
    pub processing_ttl: Duration,
    /// TTL of a `Processed` record in the fast tier; the durable tier
    /// remembers events past this horizon
    pub processed_ttl: Duration,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            processing_ttl: Duration::from_secs(5 * 60),
            processed_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breaker_config_roundtrips_through_json() {
        let config = BreakerConfig { failure_threshold: 3, ..BreakerConfig::default() };
        let json = serde_json::to_string(&config).expect("serialize");
        let back: BreakerConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(config, back);
    }

    #[test]
    fn defaults_are_sane() {
        let config = BreakerConfig::default();
        assert!(config.failure_threshold > 0);
        assert!(config.half_open_requests > 0);
        assert!(config.recovery_timeout > Duration::ZERO);

        let idem = IdempotencyConfig::default();
        assert!(idem.processed_ttl > idem.processing_ttl);
    }
}
