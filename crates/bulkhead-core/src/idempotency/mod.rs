//! At-most-once processing of inbound events (webhooks).
//!
//! Two tiers: a fast in-memory reservation table and a durable store that
//! remembers processed events across restarts. Dispatchers bracket their
//! work with a reserve/confirm handshake:
//!
//! ```text
//! reserve(event_id) → Reserved          process → mark_processed(...)
//!                   → InProgress        another worker owns it; skip
//!                   → AlreadyProcessed  done before; skip
//! ```
//!
//! A worker that fails mid-processing calls `release` so the event can be
//! retried; a worker that crashes without releasing is covered by the
//! reservation TTL.

mod durable;

pub use durable::{
    DurableEventStore, DurableStoreError, MemoryEventStore, PgEventStore, ProcessedEvent,
};

use crate::store::{InsertOutcome, KeyedStore};
use crate::telemetry::record_idempotency;
use bulkhead_types::IdempotencyConfig;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

/// Fast-tier record state. `Reserved` → `Processed`, never backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordState {
    Reserved,
    Processed,
}

/// Outcome of a reservation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// The caller owns the reservation and must eventually call
    /// `mark_processed` or `release`.
    Reserved,
    /// Another execution currently holds a live reservation.
    InProgress,
    /// The event was already processed.
    AlreadyProcessed,
}

/// Result of a read-only idempotency check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdempotencyStatus {
    NotProcessed,
    AlreadyProcessed,
}

/// Two-tier idempotency guard for inbound events.
pub struct IdempotencyGuard {
    fast: KeyedStore<RecordState>,
    durable: Option<Arc<dyn DurableEventStore>>,
    config: IdempotencyConfig,
}

impl IdempotencyGuard {
    /// Fast tier only. Deduplication is lost on restart; suitable for
    /// tests and single-process deployments that accept that.
    pub fn new(config: IdempotencyConfig) -> Self {
        Self { fast: KeyedStore::new(), durable: None, config }
    }

    /// Fast tier backed by a durable store that survives restarts.
    pub fn with_durable_store(config: IdempotencyConfig, store: Arc<dyn DurableEventStore>) -> Self {
        Self { fast: KeyedStore::new(), durable: Some(store), config }
    }

    /// Claim the right to process `event_id`. Decision-only: never blocks,
    /// never touches the durable tier.
    ///
    /// The claim is a single atomic insert-if-absent; an expired reservation
    /// left by a crashed worker counts as absent and is retaken in the same
    /// step, so exactly one of any number of concurrent callers wins.
    pub fn reserve(&self, event_id: &str) -> ReserveOutcome {
        match self.fast.insert_if_absent(
            event_id,
            RecordState::Reserved,
            self.config.processing_ttl,
        ) {
            InsertOutcome::Inserted => {
                debug!(event_id = %event_id, "reserved event for processing");
                record_idempotency("reserved");
                ReserveOutcome::Reserved
            },
            InsertOutcome::Occupied(RecordState::Reserved) => {
                record_idempotency("in_progress");
                ReserveOutcome::InProgress
            },
            InsertOutcome::Occupied(RecordState::Processed) => {
                record_idempotency("already_processed");
                ReserveOutcome::AlreadyProcessed
            },
        }
    }

    /// Read-only check, with durable-tier fallback.
    ///
    /// The durable tier covers events processed before the fast tier was
    /// cold-started or after its record expired; a durable hit rehydrates
    /// the fast tier. A durable-tier error degrades to `NotProcessed` with
    /// a warning rather than failing the caller.
    pub async fn check(&self, event_id: &str) -> IdempotencyStatus {
        match self.fast.get(event_id) {
            Some(RecordState::Processed) => return IdempotencyStatus::AlreadyProcessed,
            Some(RecordState::Reserved) => return IdempotencyStatus::NotProcessed,
            None => {},
        }

        let Some(durable) = &self.durable else {
            return IdempotencyStatus::NotProcessed;
        };
        match durable.find(event_id).await {
            Ok(Some(_)) => {
                self.fast.insert(event_id, RecordState::Processed, self.config.processed_ttl);
                IdempotencyStatus::AlreadyProcessed
            },
            Ok(None) => IdempotencyStatus::NotProcessed,
            Err(err) => {
                warn!(
                    event_id = %event_id,
                    error = %err,
                    "durable idempotency lookup failed; treating as not processed"
                );
                IdempotencyStatus::NotProcessed
            },
        }
    }

    /// Confirm processing. Writes `Processed` to the fast tier, then
    /// upserts into the durable tier (insert, ignore conflict).
    ///
    /// The two writes are not transactional: a crash between them leaves a
    /// fast-tier-only record, and once that expires the event becomes
    /// retryable. This window is an accepted eventual-consistency gap. A
    /// durable-tier failure degrades deduplication to the fast tier for the
    /// current process lifetime and is logged, never surfaced.
    pub async fn mark_processed(&self, event_id: &str, event_type: &str) {
        self.fast.insert(event_id, RecordState::Processed, self.config.processed_ttl);

        if let Some(durable) = &self.durable {
            if let Err(err) = durable.record(event_id, event_type, Utc::now()).await {
                warn!(
                    event_id = %event_id,
                    event_type = %event_type,
                    error = %err,
                    "durable idempotency write failed; dedup degraded to fast tier"
                );
            }
        }
    }

    /// Give up a reservation so the event can be retried. A `Processed`
    /// record is left untouched; processing never regresses.
    pub fn release(&self, event_id: &str) {
        if self.fast.remove_if(event_id, |state| *state == RecordState::Reserved).is_some() {
            debug!(event_id = %event_id, "released event reservation");
        }
    }
}

#[cfg(test)]
mod tests;
