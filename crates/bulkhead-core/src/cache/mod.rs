//! Request-coalescing ("single-flight") cache.
//!
//! `get_or_compute` deduplicates concurrent computations for the same key:
//! exactly one caller becomes the leader and runs the computation; everyone
//! else waits and receives the leader's result. Results are cached with a
//! TTL; failures are not cached.
//!
//! The computation runs in a spawned supervisor task, not in the leader's
//! own context. That way a leader that times out or is cancelled cannot
//! strand the waiters, and a panicking computation is caught and fanned out
//! as `ComputationFailed` instead of hanging everyone.

use crate::store::KeyedStore;
use crate::telemetry::record_cache_op;
use bulkhead_types::{CacheConfig, CacheError};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::FutureExt;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

type ResultSender<V> = broadcast::Sender<Result<V, CacheError>>;

/// TTL cache with single-flight computation per key.
pub struct CoalescingCache<V> {
    store: Arc<KeyedStore<V>>,
    pending: Arc<DashMap<String, ResultSender<V>>>,
    config: CacheConfig,
}

impl<V> CoalescingCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(config: CacheConfig) -> Self {
        Self { store: Arc::new(KeyedStore::new()), pending: Arc::new(DashMap::new()), config }
    }

    /// Return the cached value for `key`, or compute it.
    ///
    /// On a miss, exactly one concurrent caller runs `compute`; the rest
    /// wait on the same in-flight computation and observe the identical
    /// outcome. A successful value is stored with `now + ttl`; a failure is
    /// delivered to every waiter as `ComputationFailed` and never cached.
    /// Waiting is bounded by the configured `wait_timeout`; a waiter that
    /// gives up deregisters without disturbing the leader or other waiters.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        key: &str,
        ttl: Duration,
        compute: F,
    ) -> Result<V, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        if let Some(value) = self.store.get(key) {
            record_cache_op("hit");
            return Ok(value);
        }
        record_cache_op("miss");

        let mut rx = match self.pending.entry(key.to_string()) {
            Entry::Occupied(pending) => {
                record_cache_op("coalesced");
                pending.get().subscribe()
            },
            Entry::Vacant(slot) => {
                let (tx, rx) = broadcast::channel(1);
                slot.insert(tx.clone());
                self.supervise(key.to_string(), ttl, compute(), tx);
                rx
            },
        };

        match tokio::time::timeout(self.config.wait_timeout, rx.recv()).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_closed)) => {
                // Sender dropped without a result; only possible if the
                // runtime tore the supervisor down mid-flight.
                Err(CacheError::ComputationFailed {
                    key: key.to_string(),
                    message: "computation abandoned".to_string(),
                })
            },
            Err(_elapsed) => {
                warn!(key = %key, "timed out waiting for in-flight computation");
                Err(CacheError::WaitTimeout { key: key.to_string() })
            },
        }
    }

    /// Run the computation to completion in its own task and fan the
    /// outcome out. Ordering matters: the value is stored and the pending
    /// entry removed *before* the send, so a caller that misses the
    /// broadcast either finds the cached value or starts a fresh
    /// computation - it can never wait on a dead channel.
    fn supervise<Fut, E>(&self, key: String, ttl: Duration, fut: Fut, tx: ResultSender<V>)
    where
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let pending = Arc::clone(&self.pending);
        tokio::spawn(async move {
            let outcome = match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(Ok(value)) => {
                    store.insert(key.clone(), value.clone(), ttl);
                    record_cache_op("store");
                    Ok(value)
                },
                Ok(Err(err)) => {
                    debug!(key = %key, error = %err, "computation failed");
                    Err(CacheError::ComputationFailed {
                        key: key.clone(),
                        message: err.to_string(),
                    })
                },
                Err(_panic) => {
                    warn!(key = %key, "computation panicked");
                    Err(CacheError::ComputationFailed {
                        key: key.clone(),
                        message: "computation panicked".to_string(),
                    })
                },
            };
            pending.remove(&key);
            let _ = tx.send(outcome);
        });
    }

    /// Insert a value directly, superseding any cached entry.
    pub fn put(&self, key: impl Into<String>, value: V, ttl: Duration) {
        record_cache_op("store");
        self.store.insert(key, value, ttl);
    }

    /// Drop the cached entry for `key`. Has no ordering guarantee against
    /// an in-flight computation for the same key beyond: once this call
    /// returns, subsequent `get_or_compute` calls will not see the dropped
    /// value.
    pub fn invalidate(&self, key: &str) {
        self.store.remove(key);
    }

    /// Drop every cached entry whose key matches the predicate.
    pub fn invalidate_matching(&self, mut pred: impl FnMut(&str) -> bool) {
        self.store.retain(|key, _| !pred(key));
    }

    /// Spawn the advisory background sweep. Expired entries are already
    /// misses for readers; this just reclaims their memory.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let interval = self.config.sweep_interval;
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                let removed = store.purge_expired();
                if removed > 0 {
                    debug!(removed, "cache sweep removed expired entries");
                }
            }
        })
    }

    /// Number of physical entries, expired ones included until swept.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}
