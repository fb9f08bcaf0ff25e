//! Registry binding resource identifiers to breaker instances.
//!
//! Resources are identified by `(class, instance)`: the class names the
//! dependency kind ("calendar", "video", "payments", "webhook") and carries
//! the default configuration; the instance distinguishes providers or hosts
//! within it. Breakers are created lazily; creation races are settled by
//! the map's atomic entry API, so exactly one instance ever exists per id.
//!
//! An unregistered class is an error, not a bypass: running a call
//! unprotected because its breaker is missing would defeat the breaker's
//! purpose.

use super::state::RegistrySummary;
use super::{BreakerStatus, CallError, CircuitBreaker, CircuitState};
use crate::alert::{AlertSink, LogAlertSink};
use bulkhead_types::{BreakerConfig, BreakerError};
use dashmap::DashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Identifier for a guarded resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId {
    class: String,
    instance: String,
}

impl ResourceId {
    /// A parameterized resource, e.g. `("calendar", "google")` or a
    /// dynamic `("webhook", host)`.
    pub fn new(class: impl Into<String>, instance: impl Into<String>) -> Self {
        Self { class: class.into(), instance: instance.into() }
    }

    /// A class with a single instance, e.g. the payment processor.
    pub fn global(class: impl Into<String>) -> Self {
        let class = class.into();
        Self { instance: class.clone(), class }
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    fn key(&self) -> String {
        format!("{}/{}", self.class, self.instance)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.class, self.instance)
    }
}

/// Lazily-creating map from resource ids to circuit breakers.
pub struct BreakerRegistry {
    class_defaults: DashMap<String, BreakerConfig>,
    overrides: DashMap<String, BreakerConfig>,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    alerts: Arc<dyn AlertSink>,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self::with_alert_sink(Arc::new(LogAlertSink))
    }

    pub fn with_alert_sink(alerts: Arc<dyn AlertSink>) -> Self {
        Self {
            class_defaults: DashMap::new(),
            overrides: DashMap::new(),
            breakers: DashMap::new(),
            alerts,
        }
    }

    /// Register the default configuration for a resource class.
    pub fn register_class(&self, class: impl Into<String>, config: BreakerConfig) {
        self.class_defaults.insert(class.into(), config);
    }

    /// Override the configuration for one specific resource (e.g. stricter
    /// thresholds for a slower provider). Takes effect when its breaker is
    /// first created.
    pub fn register_override(&self, resource: &ResourceId, config: BreakerConfig) {
        self.overrides.insert(resource.key(), config);
    }

    /// Look up or atomically create the breaker for `resource`.
    fn breaker_for(&self, resource: &ResourceId) -> Result<Arc<CircuitBreaker>, BreakerError> {
        let key = resource.key();
        if let Some(existing) = self.breakers.get(&key) {
            return Ok(Arc::clone(&existing));
        }

        let config = self
            .overrides
            .get(&key)
            .map(|c| c.value().clone())
            .or_else(|| self.class_defaults.get(resource.class()).map(|c| c.value().clone()))
            .ok_or_else(|| BreakerError::NotFound { resource: key.clone() })?;

        // entry() settles concurrent creation: the loser discovers and
        // reuses the winner's breaker.
        let breaker = self
            .breakers
            .entry(key.clone())
            .or_insert_with(|| {
                debug!(resource = %key, "creating circuit breaker");
                Arc::new(
                    CircuitBreaker::new(key.clone(), config)
                        .with_alert_sink(Arc::clone(&self.alerts)),
                )
            })
            .clone();
        Ok(breaker)
    }

    /// Execute `f` under the breaker for `resource`, creating it on first
    /// use. An unregistered class yields `NotFound` instead of an
    /// unprotected call.
    pub async fn call<F, Fut, T, E>(&self, resource: &ResourceId, f: F) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let breaker = self.breaker_for(resource).map_err(CallError::Breaker)?;
        breaker.call(f).await
    }

    /// [`call`](Self::call) with a time limit on the wrapped call.
    pub async fn call_with_timeout<F, Fut, T, E>(
        &self,
        resource: &ResourceId,
        limit: Duration,
        f: F,
    ) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let breaker = self.breaker_for(resource).map_err(CallError::Breaker)?;
        breaker.call_with_timeout(limit, f).await
    }

    /// Status of an existing breaker; `NotFound` if it was never created.
    pub fn status(&self, resource: &ResourceId) -> Result<BreakerStatus, BreakerError> {
        self.breakers
            .get(&resource.key())
            .map(|b| b.status())
            .ok_or_else(|| BreakerError::NotFound { resource: resource.key() })
    }

    /// Manually reset an existing breaker to Closed.
    pub fn reset(&self, resource: &ResourceId) -> Result<(), BreakerError> {
        self.breakers
            .get(&resource.key())
            .map(|b| b.reset())
            .ok_or_else(|| BreakerError::NotFound { resource: resource.key() })
    }

    /// Aggregate state counts across all created breakers.
    pub fn summary(&self) -> RegistrySummary {
        let mut summary = RegistrySummary::default();
        for entry in self.breakers.iter() {
            match entry.value().current_state() {
                CircuitState::Closed => summary.closed += 1,
                CircuitState::Open => summary.open += 1,
                CircuitState::HalfOpen => summary.half_open += 1,
            }
        }
        summary
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
