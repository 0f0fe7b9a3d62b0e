// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock chat platform for deterministic testing.
//!
//! `MockChatPlatform` holds a programmable set of channels, captures every
//! outbound message for assertion, and can inject failures into sends and
//! lookups.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use courier_core::types::{
    AdapterType, ChannelKind, HealthStatus, KnownMessage, MessageId, OutboundMessage,
    ThreadHandle,
};
use courier_core::{ChatPlatform, CourierError, PluginAdapter};

/// A message captured by [`MockChatPlatform::send_to_thread`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub thread_id: String,
    pub message_id: String,
    pub message: OutboundMessage,
}

#[derive(Debug, Clone, Copy)]
struct InjectedFailure {
    retryable: bool,
}

impl InjectedFailure {
    fn into_error(self, op: &str) -> CourierError {
        CourierError::Chat {
            message: format!("injected {op} failure"),
            retryable: self.retryable,
            source: None,
        }
    }
}

#[derive(Default)]
struct State {
    channels: HashMap<String, ThreadHandle>,
    history: HashMap<String, Vec<KnownMessage>>,
    sent: Vec<SentMessage>,
    created: Vec<(String, String)>,
    send_failures: usize,
    send_failure: Option<InjectedFailure>,
    fetch_failure: Option<InjectedFailure>,
}

/// A mock chat platform.
#[derive(Clone, Default)]
pub struct MockChatPlatform {
    state: Arc<Mutex<State>>,
    send_calls: Arc<AtomicUsize>,
    fetch_calls: Arc<AtomicUsize>,
    next_id: Arc<AtomicUsize>,
}

impl MockChatPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a public thread with the given id.
    pub async fn add_thread(&self, id: &str) {
        self.add_channel(id, ChannelKind::PublicThread).await;
    }

    /// Register a channel of any kind.
    pub async fn add_channel(&self, id: &str, kind: ChannelKind) {
        self.state.lock().await.channels.insert(
            id.to_string(),
            ThreadHandle {
                id: id.to_string(),
                name: Some(format!("channel-{id}")),
                kind,
            },
        );
    }

    /// Seed the message history returned by `recent_messages`.
    pub async fn set_history(&self, thread_id: &str, messages: Vec<KnownMessage>) {
        self.state
            .lock()
            .await
            .history
            .insert(thread_id.to_string(), messages);
    }

    /// Make the next `count` sends fail.
    pub async fn fail_next_sends(&self, count: usize, retryable: bool) {
        let mut state = self.state.lock().await;
        state.send_failures = count;
        state.send_failure = Some(InjectedFailure { retryable });
    }

    /// Make every `fetch_thread` call fail until cleared with `None`.
    pub async fn fail_fetches(&self, retryable: Option<bool>) {
        self.state.lock().await.fetch_failure =
            retryable.map(|retryable| InjectedFailure { retryable });
    }

    /// All successfully sent messages, in order.
    pub async fn sent(&self) -> Vec<SentMessage> {
        self.state.lock().await.sent.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.state.lock().await.sent.len()
    }

    /// Threads created through `create_thread`, as `(parent, title)`.
    pub async fn created_threads(&self) -> Vec<(String, String)> {
        self.state.lock().await.created.clone()
    }

    /// Number of `send_to_thread` calls, including failed ones.
    pub fn send_calls(&self) -> usize {
        self.send_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    fn next_message_id(&self) -> String {
        format!("mock-msg-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl PluginAdapter for MockChatPlatform {
    fn name(&self) -> &str {
        "mock-chat"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Chat
    }

    async fn health_check(&self) -> Result<HealthStatus, CourierError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), CourierError> {
        Ok(())
    }
}

#[async_trait]
impl ChatPlatform for MockChatPlatform {
    async fn fetch_thread(&self, thread_id: &str) -> Result<Option<ThreadHandle>, CourierError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().await;
        if let Some(failure) = state.fetch_failure {
            return Err(failure.into_error("fetch"));
        }
        Ok(state.channels.get(thread_id).cloned())
    }

    async fn send_to_thread(
        &self,
        thread: &ThreadHandle,
        message: &OutboundMessage,
    ) -> Result<MessageId, CourierError> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().await;
        if state.send_failures > 0 {
            state.send_failures -= 1;
            let failure = state
                .send_failure
                .unwrap_or(InjectedFailure { retryable: true });
            return Err(failure.into_error("send"));
        }
        if !state.channels.contains_key(&thread.id) {
            return Err(CourierError::Chat {
                message: format!("unknown channel {}", thread.id),
                retryable: false,
                source: None,
            });
        }

        let message_id = self.next_message_id();
        if let Some(content) = &message.content {
            state
                .history
                .entry(thread.id.clone())
                .or_default()
                .push(KnownMessage::new(message_id.clone(), content.clone()));
        }
        state.sent.push(SentMessage {
            thread_id: thread.id.clone(),
            message_id: message_id.clone(),
            message: message.clone(),
        });
        Ok(MessageId(message_id))
    }

    async fn recent_messages(
        &self,
        thread: &ThreadHandle,
        limit: usize,
    ) -> Result<Vec<KnownMessage>, CourierError> {
        let state = self.state.lock().await;
        let history = state.history.get(&thread.id).cloned().unwrap_or_default();
        let skip = history.len().saturating_sub(limit);
        Ok(history.into_iter().skip(skip).collect())
    }

    async fn create_thread(
        &self,
        parent_channel_id: &str,
        title: &str,
    ) -> Result<ThreadHandle, CourierError> {
        let id = format!("thread-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let handle = ThreadHandle {
            id: id.clone(),
            name: Some(title.to_string()),
            kind: ChannelKind::PublicThread,
        };
        let mut state = self.state.lock().await;
        state.channels.insert(id, handle.clone());
        state
            .created
            .push((parent_channel_id.to_string(), title.to_string()));
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_captures_and_extends_history() {
        let chat = MockChatPlatform::new();
        chat.add_thread("th-1").await;
        let thread = chat.fetch_thread("th-1").await.unwrap().unwrap();

        let id = chat
            .send_to_thread(&thread, &OutboundMessage::text("hello"))
            .await
            .unwrap();
        assert_eq!(chat.sent_count().await, 1);
        let history = chat.recent_messages(&thread, 10).await.unwrap();
        assert_eq!(history, vec![KnownMessage::new(id.0, "hello")]);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed_in_order() {
        let chat = MockChatPlatform::new();
        chat.add_thread("th-1").await;
        let thread = chat.fetch_thread("th-1").await.unwrap().unwrap();
        chat.fail_next_sends(2, true).await;

        let msg = OutboundMessage::text("x");
        assert!(chat.send_to_thread(&thread, &msg).await.unwrap_err().is_transient());
        assert!(chat.send_to_thread(&thread, &msg).await.is_err());
        assert!(chat.send_to_thread(&thread, &msg).await.is_ok());
        assert_eq!(chat.send_calls(), 3);
        assert_eq!(chat.sent_count().await, 1);
    }

    #[tokio::test]
    async fn recent_messages_returns_tail() {
        let chat = MockChatPlatform::new();
        chat.add_thread("th-1").await;
        chat.set_history(
            "th-1",
            (0..5).map(|i| KnownMessage::new(i.to_string(), format!("m{i}"))).collect(),
        )
        .await;
        let thread = chat.fetch_thread("th-1").await.unwrap().unwrap();
        let tail = chat.recent_messages(&thread, 2).await.unwrap();
        let ids: Vec<_> = tail.iter().map(|m| m.id.clone().unwrap()).collect();
        assert_eq!(ids, ["3", "4"]);
    }

    #[tokio::test]
    async fn unknown_thread_fetches_as_none() {
        let chat = MockChatPlatform::new();
        assert!(chat.fetch_thread("missing").await.unwrap().is_none());
        chat.fail_fetches(Some(false)).await;
        assert!(!chat.fetch_thread("missing").await.unwrap_err().is_transient());
    }
}
