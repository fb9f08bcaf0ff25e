use super::*;
use std::time::Duration;

fn quick_config() -> IdempotencyConfig {
    IdempotencyConfig {
        processing_ttl: Duration::from_millis(30),
        processed_ttl: Duration::from_secs(60),
    }
}

#[tokio::test]
async fn duplicate_delivery_is_processed_once() {
    let guard = IdempotencyGuard::new(quick_config());

    assert_eq!(guard.reserve("evt_1"), ReserveOutcome::Reserved);
    guard.mark_processed("evt_1", "invoice.paid").await;

    // Network retry delivers the same event again.
    assert_eq!(guard.reserve("evt_1"), ReserveOutcome::AlreadyProcessed);
    assert_eq!(guard.check("evt_1").await, IdempotencyStatus::AlreadyProcessed);
}

#[tokio::test]
async fn concurrent_reserves_have_one_winner() {
    let guard = std::sync::Arc::new(IdempotencyGuard::new(quick_config()));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let guard = std::sync::Arc::clone(&guard);
        handles.push(std::thread::spawn(move || guard.reserve("evt_2")));
    }
    let outcomes: Vec<_> =
        handles.into_iter().map(|h| h.join().expect("thread")).collect();

    let winners = outcomes.iter().filter(|o| **o == ReserveOutcome::Reserved).count();
    assert_eq!(winners, 1);
    assert!(outcomes.iter().all(|o| matches!(o, ReserveOutcome::Reserved | ReserveOutcome::InProgress)));
}

#[tokio::test]
async fn release_makes_the_event_retryable() {
    let guard = IdempotencyGuard::new(quick_config());

    assert_eq!(guard.reserve("evt_3"), ReserveOutcome::Reserved);
    assert_eq!(guard.reserve("evt_3"), ReserveOutcome::InProgress);

    guard.release("evt_3");
    assert_eq!(guard.reserve("evt_3"), ReserveOutcome::Reserved);
}

#[tokio::test]
async fn release_never_regresses_a_processed_event() {
    let guard = IdempotencyGuard::new(quick_config());

    assert_eq!(guard.reserve("evt_4"), ReserveOutcome::Reserved);
    guard.mark_processed("evt_4", "meeting.cancelled").await;

    guard.release("evt_4");
    assert_eq!(guard.reserve("evt_4"), ReserveOutcome::AlreadyProcessed);
}

#[tokio::test]
async fn stale_reservation_from_a_crashed_worker_is_retaken() {
    let guard = IdempotencyGuard::new(quick_config());

    assert_eq!(guard.reserve("evt_5"), ReserveOutcome::Reserved);
    // Worker crashes without release; its reservation expires.
    std::thread::sleep(Duration::from_millis(40));

    assert_eq!(guard.reserve("evt_5"), ReserveOutcome::Reserved);
}

#[tokio::test]
async fn durable_tier_covers_a_cold_started_fast_tier() {
    let durable = std::sync::Arc::new(MemoryEventStore::new());

    {
        let guard =
            IdempotencyGuard::with_durable_store(quick_config(), durable.clone());
        assert_eq!(guard.reserve("evt_6"), ReserveOutcome::Reserved);
        guard.mark_processed("evt_6", "refund.created").await;
    }

    // "Restart": fresh guard, empty fast tier, same durable store.
    let guard = IdempotencyGuard::with_durable_store(quick_config(), durable.clone());
    assert_eq!(guard.check("evt_6").await, IdempotencyStatus::AlreadyProcessed);

    // The durable hit rehydrated the fast tier.
    assert_eq!(guard.reserve("evt_6"), ReserveOutcome::AlreadyProcessed);
}

#[tokio::test]
async fn durable_write_is_idempotent() {
    let durable = std::sync::Arc::new(MemoryEventStore::new());
    let guard = IdempotencyGuard::with_durable_store(quick_config(), durable.clone());

    guard.mark_processed("evt_7", "invoice.paid").await;
    guard.mark_processed("evt_7", "invoice.paid").await;

    assert_eq!(durable.len(), 1);
    let stored = durable.find("evt_7").await.expect("lookup").expect("present");
    assert_eq!(stored.event_type, "invoice.paid");
}

#[tokio::test]
async fn durable_failures_degrade_but_do_not_fail() {
    struct BrokenStore;

    #[async_trait::async_trait]
    impl DurableEventStore for BrokenStore {
        async fn find(
            &self,
            _event_id: &str,
        ) -> Result<Option<ProcessedEvent>, DurableStoreError> {
            Err(DurableStoreError::Database("connection refused".to_string()))
        }

        async fn record(
            &self,
            _event_id: &str,
            _event_type: &str,
            _processed_at: chrono::DateTime<chrono::Utc>,
        ) -> Result<(), DurableStoreError> {
            Err(DurableStoreError::Database("connection refused".to_string()))
        }
    }

    let guard = IdempotencyGuard::with_durable_store(
        quick_config(),
        std::sync::Arc::new(BrokenStore),
    );

    // mark_processed swallows the durable failure...
    assert_eq!(guard.reserve("evt_8"), ReserveOutcome::Reserved);
    guard.mark_processed("evt_8", "dispute.opened").await;

    // ...and fast-tier dedup still works for this process lifetime.
    assert_eq!(guard.reserve("evt_8"), ReserveOutcome::AlreadyProcessed);

    // check degrades to NotProcessed for unknown events.
    assert_eq!(guard.check("evt_9").await, IdempotencyStatus::NotProcessed);
}
