// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `conversation_updated`: announce a ticket status change in its thread.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use courier_core::types::{MessageId, OutboundMessage};
use courier_core::{ChatPlatform, CourierError, InboundEvent};
use courier_dispatch::{EventHandler, HandlerOutcome};
use courier_resolver::{MappingResolver, RetryOptions};

use crate::payload::{StatusPayload, parse};

/// Text of the notice posted for a status change.
pub fn status_notice(payload: &StatusPayload) -> String {
    let mut notice = format!("Ticket status changed to **{}**", payload.status.trim());
    if let Some(note) = payload.note.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        notice.push('\n');
        notice.push_str(note);
    }
    notice
}

pub struct StatusHandler {
    resolver: Arc<MappingResolver>,
    chat: Arc<dyn ChatPlatform>,
    retry: RetryOptions,
}

impl StatusHandler {
    pub fn new(
        resolver: Arc<MappingResolver>,
        chat: Arc<dyn ChatPlatform>,
        retry: RetryOptions,
    ) -> Self {
        Self {
            resolver,
            chat,
            retry,
        }
    }

    pub async fn deliver(&self, event: &InboundEvent) -> Result<MessageId, CourierError> {
        let payload: StatusPayload = parse(event)?;
        if payload.status.trim().is_empty() {
            return Err(CourierError::invalid_payload(event.event_type, "status is empty"));
        }
        let resolved = self
            .resolver
            .resolve_with_retry(&event.ticket_id, self.retry, None)
            .await?;
        let id = self
            .chat
            .send_to_thread(&resolved.thread, &OutboundMessage::text(status_notice(&payload)))
            .await?;
        debug!(ticket_id = %event.ticket_id, status = %payload.status, "status notice posted");
        Ok(id)
    }
}

#[async_trait]
impl EventHandler for StatusHandler {
    async fn handle(&self, event: &InboundEvent) -> HandlerOutcome {
        self.deliver(event).await.map(|_| ()).into()
    }
}
