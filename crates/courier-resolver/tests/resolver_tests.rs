// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resolver behaviour under the ticket-creation / mapping race.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use courier_core::types::{ChannelKind, NewMapping, TicketThreadMapping};
use courier_core::{CourierError, MappingStore};
use courier_resolver::{MappingLookup, MappingResolver, RetryOptions};
use courier_test_utils::{ManualScheduler, MemoryMappingStore, MockChatPlatform};

struct Fixture {
    mappings: MemoryMappingStore,
    chat: MockChatPlatform,
    clock: ManualScheduler,
    resolver: MappingResolver,
}

fn fixture() -> Fixture {
    let mappings = MemoryMappingStore::new();
    let chat = MockChatPlatform::new();
    let clock = ManualScheduler::new();
    let resolver = MappingResolver::new(
        Arc::new(mappings.clone()),
        Arc::new(chat.clone()),
        Arc::new(clock.clone()),
    );
    Fixture {
        mappings,
        chat,
        clock,
        resolver,
    }
}

fn options(max_attempts: u32) -> RetryOptions {
    RetryOptions {
        max_attempts,
        base_delay: Duration::from_millis(100),
        max_retry_window: Duration::from_secs(30),
    }
}

fn expect_unavailable(result: Result<impl std::fmt::Debug, CourierError>) -> courier_core::ResolveFailure {
    match result {
        Err(CourierError::MappingUnavailable(failure)) => *failure,
        other => panic!("expected MappingUnavailable, got {other:?}"),
    }
}

#[tokio::test]
async fn resolves_immediately_when_mapping_exists() {
    let f = fixture();
    f.mappings.insert("T-1", "th-1").await;
    f.chat.add_thread("th-1").await;

    let resolved = f
        .resolver
        .resolve_with_retry("T-1", options(5), None)
        .await
        .unwrap();
    assert_eq!(resolved.thread.id, "th-1");
    assert_eq!(resolved.mapping.ticket_id, "T-1");
    assert_eq!(f.mappings.lookups_for("T-1").await, 1);
    assert!(f.clock.delays().is_empty());
}

#[tokio::test]
async fn mapping_appearing_on_nth_lookup_takes_exactly_n_lookups() {
    for n in 1..=4 {
        let f = fixture();
        f.mappings.appear_on_lookup("T-1", "th-1", n).await;
        f.chat.add_thread("th-1").await;

        let resolved = f
            .resolver
            .resolve_with_retry("T-1", options(5), None)
            .await
            .unwrap();
        assert_eq!(resolved.thread.id, "th-1");
        assert_eq!(f.mappings.lookups_for("T-1").await, n);
        assert_eq!(f.clock.delays().len() as u32, n - 1);
    }
}

#[tokio::test]
async fn delays_grow_exponentially_with_bounded_jitter() {
    let f = fixture();
    let _ = f.resolver.resolve_with_retry("T-1", options(5), None).await;

    let delays = f.clock.delays();
    assert_eq!(delays.len(), 4);
    for (i, delay) in delays.iter().enumerate() {
        let floor = Duration::from_millis(100) * 2u32.pow(i as u32);
        assert!(*delay >= floor, "delay {i} = {delay:?}");
        assert!(*delay < floor + Duration::from_millis(100), "delay {i} = {delay:?}");
    }
}

#[tokio::test]
async fn exhaustion_inside_window_is_flagged_as_race() {
    let f = fixture();
    let failure = expect_unavailable(f.resolver.resolve_with_retry("T-1", options(4), None).await);

    assert_eq!(failure.attempts_made, 4);
    assert_eq!(failure.ticket_id, "T-1");
    assert_eq!(failure.total_retry_time, f.clock.total_slept());
    assert!(failure.likely_race_condition);
    assert_eq!(f.mappings.lookups_for("T-1").await, 4);
}

#[tokio::test]
#[tracing_test::traced_test]
async fn window_stopping_retries_is_reported_as_outage() {
    let f = fixture();
    let opts = RetryOptions {
        max_attempts: 10,
        base_delay: Duration::from_secs(4),
        max_retry_window: Duration::from_secs(20),
    };
    let failure = expect_unavailable(f.resolver.resolve_with_retry("T-1", opts, None).await);

    // 4..8 s then 8..12 s fit; the third delay (16..20 s) cannot.
    assert_eq!(failure.attempts_made, 3);
    assert!(f.clock.total_slept() <= opts.max_retry_window);
    assert!(!failure.likely_race_condition);
    assert!(logs_contain("looks like a real outage"));
    assert!(!logs_contain("probably a creation race"));
}

#[tokio::test]
async fn mapping_that_never_appears_within_window_is_not_blamed_on_a_race() {
    let f = fixture();
    let opts = RetryOptions {
        max_attempts: 10,
        base_delay: Duration::from_secs(1),
        max_retry_window: Duration::from_secs(10),
    };
    let failure = expect_unavailable(f.resolver.resolve_with_retry("T-1", opts, None).await);

    assert!(failure.attempts_made < opts.max_attempts);
    assert_eq!(failure.attempts_made, 4);
    assert!(failure.total_retry_time < opts.max_retry_window);
    assert!(!failure.likely_race_condition);
}

/// A store whose every lookup takes longer than the whole retry window.
struct SlowStore {
    clock: ManualScheduler,
}

#[async_trait]
impl MappingStore for SlowStore {
    async fn get_by_ticket_id(
        &self,
        _ticket_id: &str,
    ) -> Result<Option<TicketThreadMapping>, CourierError> {
        self.clock.advance(Duration::from_secs(40));
        Ok(None)
    }

    async fn create(&self, _mapping: &NewMapping) -> Result<TicketThreadMapping, CourierError> {
        Err(CourierError::Internal("read-only".into()))
    }
}

#[tokio::test]
#[tracing_test::traced_test]
async fn exhausting_the_window_is_reported_as_outage() {
    let clock = ManualScheduler::new();
    let resolver = MappingResolver::new(
        Arc::new(SlowStore {
            clock: clock.clone(),
        }),
        Arc::new(MockChatPlatform::new()),
        Arc::new(clock.clone()),
    );

    let failure = expect_unavailable(resolver.resolve_with_retry("T-7", options(5), None).await);
    assert_eq!(failure.attempts_made, 1);
    assert_eq!(failure.total_retry_time, Duration::from_secs(40));
    assert!(!failure.likely_race_condition);
    assert!(logs_contain("looks like a real outage"));
}

#[tokio::test]
#[tracing_test::traced_test]
async fn race_warning_mentions_manual_retry() {
    let f = fixture();
    let _ = f.resolver.resolve_with_retry("T-2", options(2), None).await;
    assert!(logs_contain("probably a creation race"));
}

#[tokio::test]
async fn fast_path_is_consulted_first() {
    let f = fixture();
    let fast = MemoryMappingStore::new();
    fast.insert("T-1", "th-fast").await;
    f.chat.add_thread("th-fast").await;

    let resolved = f
        .resolver
        .resolve_with_retry("T-1", options(3), Some(&fast))
        .await
        .unwrap();
    assert_eq!(resolved.thread.id, "th-fast");
    assert_eq!(fast.lookups_for("T-1").await, 1);
    assert_eq!(f.mappings.lookups_for("T-1").await, 0);
}

#[tokio::test]
async fn fast_path_miss_or_failure_falls_back_to_canonical() {
    let f = fixture();
    f.mappings.insert("T-1", "th-1").await;
    f.chat.add_thread("th-1").await;

    let empty = MemoryMappingStore::new();
    let resolved = f
        .resolver
        .resolve_with_retry("T-1", options(3), Some(&empty))
        .await
        .unwrap();
    assert_eq!(resolved.thread.id, "th-1");

    let broken = MemoryMappingStore::new();
    broken.fail_lookups("cache offline").await;
    let lookup = f.resolver.lookup("T-1", Some(&broken)).await;
    assert!(matches!(lookup, MappingLookup::Found(m) if m.thread_id == "th-1"));
}

#[tokio::test]
async fn canonical_store_failure_is_fatal_without_retry() {
    let f = fixture();
    f.mappings.fail_lookups("database is locked").await;

    let err = f
        .resolver
        .resolve_with_retry("T-1", options(5), None)
        .await
        .unwrap_err();
    assert!(matches!(err, CourierError::Storage { .. }));
    assert_eq!(f.mappings.lookups_for("T-1").await, 1);
    assert!(f.clock.delays().is_empty());
}

#[tokio::test]
async fn missing_thread_is_not_retried() {
    let f = fixture();
    f.mappings.insert("T-1", "th-gone").await;

    let err = f
        .resolver
        .resolve_with_retry("T-1", options(5), None)
        .await
        .unwrap_err();
    assert!(matches!(err, CourierError::ThreadNotFound { .. }));
    assert_eq!(f.mappings.lookups_for("T-1").await, 1);
}

#[tokio::test]
async fn non_thread_channel_is_rejected() {
    let f = fixture();
    f.mappings.insert("T-1", "general").await;
    f.chat.add_channel("general", ChannelKind::Text).await;

    let err = f.resolver.resolve("T-1").await.unwrap_err();
    assert!(matches!(err, CourierError::NotAThread { .. }));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn chat_errors_propagate_after_one_attempt() {
    let f = fixture();
    f.mappings.insert("T-1", "th-1").await;
    f.chat.add_thread("th-1").await;
    f.chat.fail_fetches(Some(true)).await;

    let err = f
        .resolver
        .resolve_with_retry("T-1", options(5), None)
        .await
        .unwrap_err();
    assert!(matches!(err, CourierError::Chat { .. }));
    assert_eq!(f.chat.fetch_calls(), 1);
    assert_eq!(f.mappings.lookups_for("T-1").await, 1);
}

#[tokio::test]
async fn single_attempt_resolve_reports_unavailable() {
    let f = fixture();
    let failure = expect_unavailable(f.resolver.resolve("T-1").await);
    assert_eq!(failure.attempts_made, 1);
    assert!(failure.likely_race_condition);
}
