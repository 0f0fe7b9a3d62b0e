// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat platform capability consumed by the resolver and handlers.

use async_trait::async_trait;

use crate::error::CourierError;
use crate::types::{KnownMessage, MessageId, OutboundMessage, ThreadHandle};

/// The outbound side of the chat platform.
///
/// Implementations wrap the platform's HTTP client. Errors should use
/// [`CourierError::Chat`] with `retryable` set for rate limits and 5xx
/// responses so the dispatcher can requeue them.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Look up a channel by id. `Ok(None)` when it does not exist.
    async fn fetch_thread(&self, thread_id: &str) -> Result<Option<ThreadHandle>, CourierError>;

    /// Post text and/or files into a thread.
    async fn send_to_thread(
        &self,
        thread: &ThreadHandle,
        message: &OutboundMessage,
    ) -> Result<MessageId, CourierError>;

    /// The most recent messages in a thread, oldest first.
    async fn recent_messages(
        &self,
        thread: &ThreadHandle,
        limit: usize,
    ) -> Result<Vec<KnownMessage>, CourierError>;

    /// Create the thread that will carry a ticket's conversation.
    async fn create_thread(
        &self,
        parent_channel_id: &str,
        title: &str,
    ) -> Result<ThreadHandle, CourierError>;
}
