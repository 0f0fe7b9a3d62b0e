// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue to chat thread through the dispatcher, on SQLite.

use std::sync::Arc;
use std::time::Duration;

use courier_attachments::{AttachmentLimits, AttachmentPipeline, BufferPool};
use courier_bridge::{BridgeDeps, DEFAULT_HISTORY_LIMIT, register_all};
use courier_config::model::{QueueConfig, StorageConfig};
use courier_core::types::QueueName;
use courier_core::{Backoff, EventStore, EventType, InboundEvent, MappingStore};
use courier_dispatch::{Dispatcher, DispatcherOptions, Transition};
use courier_resolver::{MappingResolver, RetryOptions};
use courier_storage::SqliteStorage;
use courier_test_utils::{ManualScheduler, MockChatPlatform, MockFileSource};
use serde_json::json;

#[tokio::test]
async fn message_arriving_before_its_thread_is_delivered_after_retry() {
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualScheduler::new();
    let storage = SqliteStorage::new(
        StorageConfig {
            database_path: dir.path().join("courier.db").display().to_string(),
            wal_mode: true,
        },
        QueueConfig {
            max_retries: 3,
            dedup_ttl_secs: 300,
            processing_lease_secs: 60,
        },
    )
    .with_clock(Arc::new(clock.clone()));
    storage.initialize().await.unwrap();
    let storage = Arc::new(storage);

    let chat = MockChatPlatform::new();
    let resolver = Arc::new(MappingResolver::new(
        storage.clone(),
        Arc::new(chat.clone()),
        Arc::new(clock.clone()),
    ));
    let pipeline = Arc::new(AttachmentPipeline::new(
        Arc::new(MockFileSource::new()),
        Arc::new(chat.clone()),
        Arc::new(clock.clone()),
        Arc::new(BufferPool::new(2, 1 << 20)),
        AttachmentLimits::default(),
        Backoff::new(Duration::from_millis(100), Duration::from_secs(1)),
    ));
    let deps = BridgeDeps {
        resolver,
        mappings: storage.clone(),
        chat: Arc::new(chat.clone()),
        pipeline,
        retry: RetryOptions {
            max_attempts: 2,
            base_delay: Duration::from_millis(100),
            max_retry_window: Duration::from_secs(5),
        },
        history_limit: DEFAULT_HISTORY_LIMIT,
    };

    let mut dispatcher = Dispatcher::new(
        storage.clone(),
        Arc::new(clock.clone()),
        DispatcherOptions {
            consumer_id: "flow-test".into(),
            max_retries: 3,
            backoff: Backoff::new(Duration::from_secs(1), Duration::from_secs(10)),
            concurrency: 1,
            idle_poll: Duration::from_millis(10),
            recovery_interval: Duration::from_secs(60),
        },
    );
    register_all(&mut dispatcher, &deps);
    for event_type in EventType::ALL {
        assert!(dispatcher.handles(event_type));
    }

    storage
        .enqueue(&InboundEvent::new(
            EventType::ThreadCreate,
            "T-1",
            json!({ "parent_channel_id": "support", "title": "Ticket T-1" }),
        ))
        .await
        .unwrap();
    storage
        .enqueue(&InboundEvent::new(
            EventType::MessageCreated,
            "T-1",
            json!({ "content": "My package never arrived" }),
        ))
        .await
        .unwrap();

    // Messages outrank thread creation, so the message runs first and misses.
    let first = dispatcher.run_once().await.unwrap();
    assert!(matches!(first, Some(Transition::Requeued { .. })));
    assert_eq!(dispatcher.run_once().await.unwrap(), Some(Transition::Acked));
    let mapping = storage.get_by_ticket_id("T-1").await.unwrap().unwrap();

    clock.advance(Duration::from_secs(2));
    assert_eq!(dispatcher.run_once().await.unwrap(), Some(Transition::Acked));
    assert_eq!(dispatcher.run_once().await.unwrap(), None);

    let sent = chat.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].thread_id, mapping.thread_id);
    assert_eq!(sent[0].message.content.as_deref(), Some("My package never arrived"));

    let stats = storage.stats().await.unwrap();
    assert_eq!(stats.depth(QueueName::Events), 0);
    assert_eq!(stats.depth(QueueName::DeadLetter), 0);
}
