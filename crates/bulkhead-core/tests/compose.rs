//! End-to-end composition: a webhook dispatcher that reserves an event,
//! then fetches provider data through a breaker-guarded, coalesced call.

use bulkhead_core::{
    BreakerConfig, BreakerRegistry, CacheConfig, CircuitState, CoalescingCache, IdempotencyConfig,
    IdempotencyGuard, ResourceId, ReserveOutcome,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

#[tokio::test]
async fn webhook_dispatch_happy_path() {
    init_tracing();
    let registry = BreakerRegistry::new();
    registry.register_class("calendar", BreakerConfig::default());
    let cache: CoalescingCache<String> = CoalescingCache::new(CacheConfig::default());
    let guard = IdempotencyGuard::new(IdempotencyConfig::default());
    let resource = ResourceId::new("calendar", "google");

    let provider_calls = Arc::new(AtomicUsize::new(0));
    let handled = Arc::new(AtomicUsize::new(0));

    // The same event arrives twice (provider retry).
    for _ in 0..2 {
        match guard.reserve("evt_booking_42") {
            ReserveOutcome::Reserved => {},
            ReserveOutcome::InProgress | ReserveOutcome::AlreadyProcessed => continue,
        }

        let calls = Arc::clone(&provider_calls);
        let availability = registry
            .call(&resource, || {
                let cache = &cache;
                async move {
                    cache
                        .get_or_compute("availability:42", Duration::from_secs(30), move || {
                            async move {
                                calls.fetch_add(1, Ordering::SeqCst);
                                Ok::<_, String>("free 9-10am".to_string())
                            }
                        })
                        .await
                }
            })
            .await
            .expect("guarded call succeeds");
        assert_eq!(availability, "free 9-10am");

        handled.fetch_add(1, Ordering::SeqCst);
        guard.mark_processed("evt_booking_42", "booking.created").await;
    }

    assert_eq!(handled.load(Ordering::SeqCst), 1);
    assert_eq!(provider_calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        registry.status(&resource).expect("breaker created").state,
        CircuitState::Closed
    );
}

#[tokio::test]
async fn failing_provider_trips_the_breaker_and_event_stays_retryable() {
    let registry = BreakerRegistry::new();
    registry.register_class(
        "calendar",
        BreakerConfig { failure_threshold: 2, ..BreakerConfig::default() },
    );
    let guard = IdempotencyGuard::new(IdempotencyConfig::default());
    let resource = ResourceId::new("calendar", "outlook");

    for _ in 0..2 {
        assert_eq!(guard.reserve("evt_reschedule_7"), ReserveOutcome::Reserved);

        let result = registry
            .call(&resource, || async { Err::<String, _>("503 from provider") })
            .await;
        assert!(result.is_err());

        // Processing failed: give the reservation back for a later retry.
        guard.release("evt_reschedule_7");
    }

    assert_eq!(
        registry.status(&resource).expect("breaker created").state,
        CircuitState::Open
    );
    // The event was never confirmed, so a retry can still claim it.
    assert_eq!(guard.reserve("evt_reschedule_7"), ReserveOutcome::Reserved);
}
