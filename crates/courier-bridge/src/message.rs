// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `message_created`: post a ticket message into its thread.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use courier_core::types::OutboundMessage;
use courier_core::{ChatPlatform, CourierError, InboundEvent};
use courier_dispatch::{EventHandler, HandlerOutcome};
use courier_reconcile::reconcile;
use courier_resolver::{MappingResolver, RetryOptions};

use crate::payload::{MessagePayload, parse};

/// What the handler did with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent { message_id: String, reply_to: Option<String> },
    /// Already present in the thread.
    Duplicate,
    /// Nothing left to post once the attachment listing was removed.
    Empty,
}

pub struct MessageHandler {
    resolver: Arc<MappingResolver>,
    chat: Arc<dyn ChatPlatform>,
    retry: RetryOptions,
    history_limit: usize,
}

impl MessageHandler {
    pub fn new(
        resolver: Arc<MappingResolver>,
        chat: Arc<dyn ChatPlatform>,
        retry: RetryOptions,
        history_limit: usize,
    ) -> Self {
        Self {
            resolver,
            chat,
            retry,
            history_limit,
        }
    }

    pub async fn deliver(&self, event: &InboundEvent) -> Result<Delivery, CourierError> {
        let payload: MessagePayload = parse(event)?;
        let resolved = self
            .resolver
            .resolve_with_retry(&event.ticket_id, self.retry, None)
            .await?;
        let thread = resolved.thread;

        let prior = self.chat.recent_messages(&thread, self.history_limit).await?;
        let context = reconcile(&payload.content, &prior);

        if context.is_duplicate {
            info!(
                ticket_id = %event.ticket_id,
                event_id = %event.id,
                thread_id = %thread.id,
                "message already in thread, skipping"
            );
            return Ok(Delivery::Duplicate);
        }
        if context.matched_message_id.is_none() && context.remainder_text.trim().is_empty() {
            debug!(ticket_id = %event.ticket_id, event_id = %event.id, "nothing to post");
            return Ok(Delivery::Empty);
        }

        let message = OutboundMessage {
            content: Some(context.remainder_text),
            reply_to: context.matched_message_id.clone(),
            files: Vec::new(),
        };
        let message_id = self.chat.send_to_thread(&thread, &message).await?;
        debug!(
            ticket_id = %event.ticket_id,
            thread_id = %thread.id,
            message_id = %message_id.0,
            reply = message.reply_to.is_some(),
            "message delivered"
        );
        Ok(Delivery::Sent {
            message_id: message_id.0,
            reply_to: context.matched_message_id,
        })
    }
}

#[async_trait]
impl EventHandler for MessageHandler {
    async fn handle(&self, event: &InboundEvent) -> HandlerOutcome {
        self.deliver(event).await.map(|_| ()).into()
    }
}
