// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `thread_create`: open a ticket's thread and record the mapping.
//!
//! Events for the ticket that arrive before the mapping is written are the
//! race the resolver retries through.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, warn};

use courier_core::types::{NewMapping, ThreadHandle, TicketThreadMapping};
use courier_core::{ChatPlatform, CourierError, InboundEvent, MappingStore};
use courier_dispatch::{EventHandler, HandlerOutcome};

use crate::payload::{ThreadCreatePayload, parse};

pub struct ThreadCreateHandler {
    mappings: Arc<dyn MappingStore>,
    chat: Arc<dyn ChatPlatform>,
    /// Threads created whose mapping could not be stored yet, by ticket id.
    /// A redelivery reuses them instead of creating another thread.
    unmapped: Mutex<HashMap<String, ThreadHandle>>,
}

impl ThreadCreateHandler {
    pub fn new(mappings: Arc<dyn MappingStore>, chat: Arc<dyn ChatPlatform>) -> Self {
        Self {
            mappings,
            chat,
            unmapped: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the mapping, existing or new. A redelivered event for a
    /// ticket that already has a thread creates nothing.
    ///
    /// If another writer maps the ticket first, its mapping wins and is
    /// returned.
    pub async fn open(&self, event: &InboundEvent) -> Result<TicketThreadMapping, CourierError> {
        let payload: ThreadCreatePayload = parse(event)?;
        let ticket_id = &event.ticket_id;

        if let Some(existing) = self.mappings.get_by_ticket_id(ticket_id).await? {
            info!(%ticket_id, thread_id = %existing.thread_id, "ticket already has a thread");
            self.unmapped.lock().await.remove(ticket_id);
            return Ok(existing);
        }

        let earlier = self.unmapped.lock().await.get(ticket_id).cloned();
        let thread = match earlier {
            Some(thread) => {
                info!(%ticket_id, thread_id = %thread.id, "reusing thread from an earlier attempt");
                thread
            }
            None => {
                self.chat
                    .create_thread(&payload.parent_channel_id, &payload.title)
                    .await?
            }
        };

        let mapping = NewMapping {
            ticket_id: ticket_id.clone(),
            thread_id: thread.id.clone(),
            discord_user_id: payload.discord_user_id,
            customer_id: payload.customer_id,
        };
        match self.mappings.create(&mapping).await {
            Ok(created) => {
                self.unmapped.lock().await.remove(ticket_id);
                info!(%ticket_id, thread_id = %thread.id, "thread created");
                Ok(created)
            }
            Err(conflict @ CourierError::MappingConflict { .. }) => {
                self.unmapped.lock().await.remove(ticket_id);
                let Some(winner) = self.mappings.get_by_ticket_id(ticket_id).await? else {
                    return Err(conflict);
                };
                warn!(
                    %ticket_id,
                    thread_id = %winner.thread_id,
                    orphaned_thread_id = %thread.id,
                    "ticket was mapped concurrently, keeping the existing thread"
                );
                Ok(winner)
            }
            Err(e) => {
                warn!(
                    %ticket_id,
                    thread_id = %thread.id,
                    error = %e,
                    "thread created but mapping could not be stored"
                );
                self.unmapped.lock().await.insert(ticket_id.clone(), thread);
                Err(e)
            }
        }
    }
}

#[async_trait]
impl EventHandler for ThreadCreateHandler {
    async fn handle(&self, event: &InboundEvent) -> HandlerOutcome {
        self.open(event).await.map(|_| ()).into()
    }
}
