//! Operational alerting for resilience events.
//!
//! The sink is fire-and-forget: a panicking or failing sink must never fail
//! the caller's operation, so notifications go through a catch_unwind guard.

use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{info, warn};

/// An operational event worth surfacing to on-call tooling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertEvent {
    /// A breaker tripped open; calls to the resource now fail fast.
    BreakerOpened { resource: String, failures: u32 },
    /// A breaker began admitting trial calls.
    BreakerHalfOpen { resource: String },
    /// A breaker closed; the resource recovered.
    BreakerClosed { resource: String },
}

/// Destination for operational notifications (pager, Slack webhook, ...).
///
/// Implementations should return quickly; anything slow belongs on a task
/// the implementation spawns itself.
pub trait AlertSink: Send + Sync {
    fn notify(&self, event: AlertEvent);
}

/// Default sink that writes alerts to the log.
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn notify(&self, event: AlertEvent) {
        match event {
            AlertEvent::BreakerOpened { resource, failures } => {
                warn!(resource = %resource, failures, "circuit breaker opened");
            },
            AlertEvent::BreakerHalfOpen { resource } => {
                info!(resource = %resource, "circuit breaker half-open, admitting trials");
            },
            AlertEvent::BreakerClosed { resource } => {
                info!(resource = %resource, "circuit breaker closed, resource recovered");
            },
        }
    }
}

/// Deliver an event, swallowing sink panics.
pub(crate) fn notify_guarded(sink: &dyn AlertSink, event: AlertEvent) {
    if catch_unwind(AssertUnwindSafe(|| sink.notify(event))).is_err() {
        warn!("alert sink panicked; notification dropped");
    }
}
