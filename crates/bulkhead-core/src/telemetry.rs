//! Prometheus-style counters for resilience-plane observability.
//!
//! Tracks breaker state transitions, cache hit/miss/coalesce rates, and
//! idempotency outcomes. Counters are no-ops until the embedding
//! application installs a metrics recorder.

use metrics::{counter, describe_counter};

/// Register all metric descriptions. Call once at startup from the
/// embedding application's metrics setup.
pub fn init_metrics() {
    describe_counter!(
        "bulkhead_breaker_transitions_total",
        "Circuit breaker state transitions by resource and target state"
    );
    describe_counter!(
        "bulkhead_cache_total",
        "Coalescing cache operations by result (hit, miss, coalesced, store)"
    );
    describe_counter!(
        "bulkhead_idempotency_total",
        "Idempotency reservation outcomes (reserved, in_progress, already_processed)"
    );
}

/// Record a breaker state transition.
///
/// Labels: to = "open" | "half_open" | "closed"
pub(crate) fn record_breaker_transition(resource: &str, to: &str) {
    let labels = [("resource", resource.to_string()), ("to", to.to_string())];
    counter!("bulkhead_breaker_transitions_total", &labels).increment(1);
}

/// Record a cache operation.
///
/// Labels: op = "hit" | "miss" | "coalesced" | "store"
pub(crate) fn record_cache_op(op: &str) {
    let labels = [("op", op.to_string())];
    counter!("bulkhead_cache_total", &labels).increment(1);
}

/// Record an idempotency reservation outcome.
pub(crate) fn record_idempotency(outcome: &str) {
    let labels = [("outcome", outcome.to_string())];
    counter!("bulkhead_idempotency_total", &labels).increment(1);
}
