// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory mapping store that can simulate the creation/mapping race.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use courier_core::types::{NewMapping, TicketThreadMapping};
use courier_core::{CourierError, MappingStore};

#[derive(Default)]
struct State {
    mappings: HashMap<String, TicketThreadMapping>,
    /// Mappings that become visible on the Nth lookup of their ticket.
    pending: HashMap<String, (NewMapping, u32)>,
    lookups: HashMap<String, u32>,
    failure: Option<String>,
    /// Remaining `create` calls to fail with a storage error.
    failing_creates: usize,
    /// Mappings another writer stores just before our next `create`.
    competing: HashMap<String, NewMapping>,
    creates: u32,
}

/// A [`MappingStore`] backed by a `HashMap`.
#[derive(Clone, Default)]
pub struct MemoryMappingStore {
    state: Arc<Mutex<State>>,
}

fn materialize(mapping: &NewMapping) -> TicketThreadMapping {
    let now = Utc::now();
    TicketThreadMapping {
        ticket_id: mapping.ticket_id.clone(),
        thread_id: mapping.thread_id.clone(),
        discord_user_id: mapping.discord_user_id.clone(),
        customer_id: mapping.customer_id.clone(),
        created_at: now,
        updated_at: now,
    }
}

impl MemoryMappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a mapping that is visible immediately.
    pub async fn insert(&self, ticket_id: &str, thread_id: &str) {
        let mapping = NewMapping {
            ticket_id: ticket_id.to_string(),
            thread_id: thread_id.to_string(),
            ..Default::default()
        };
        self.state
            .lock()
            .await
            .mappings
            .insert(ticket_id.to_string(), materialize(&mapping));
    }

    /// Make a mapping appear only on the `nth` lookup (1-based) of its ticket.
    pub async fn appear_on_lookup(&self, ticket_id: &str, thread_id: &str, nth: u32) {
        let mapping = NewMapping {
            ticket_id: ticket_id.to_string(),
            thread_id: thread_id.to_string(),
            ..Default::default()
        };
        self.state
            .lock()
            .await
            .pending
            .insert(ticket_id.to_string(), (mapping, nth.max(1)));
    }

    /// Fail every lookup with a storage error carrying `message`.
    pub async fn fail_lookups(&self, message: &str) {
        self.state.lock().await.failure = Some(message.to_string());
    }

    /// Fail the next `count` calls to `create` with a storage error.
    pub async fn fail_next_creates(&self, count: usize) {
        self.state.lock().await.failing_creates = count;
    }

    /// Have a competing writer map `ticket_id` to `thread_id` right before
    /// the next `create` for that ticket.
    pub async fn lose_next_create(&self, ticket_id: &str, thread_id: &str) {
        let mapping = NewMapping {
            ticket_id: ticket_id.to_string(),
            thread_id: thread_id.to_string(),
            ..Default::default()
        };
        self.state
            .lock()
            .await
            .competing
            .insert(ticket_id.to_string(), mapping);
    }

    /// Number of `create` calls, including failed ones.
    pub async fn create_count(&self) -> u32 {
        self.state.lock().await.creates
    }

    /// Number of `get_by_ticket_id` calls for `ticket_id`.
    pub async fn lookups_for(&self, ticket_id: &str) -> u32 {
        self.state
            .lock()
            .await
            .lookups
            .get(ticket_id)
            .copied()
            .unwrap_or(0)
    }

    /// Total `get_by_ticket_id` calls across all tickets.
    pub async fn lookup_count(&self) -> u32 {
        self.state.lock().await.lookups.values().sum()
    }
}

#[async_trait]
impl MappingStore for MemoryMappingStore {
    async fn get_by_ticket_id(
        &self,
        ticket_id: &str,
    ) -> Result<Option<TicketThreadMapping>, CourierError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let counter = state.lookups.entry(ticket_id.to_string()).or_insert(0);
        *counter += 1;
        let count = *counter;

        if let Some(message) = &state.failure {
            return Err(CourierError::Storage {
                source: message.clone().into(),
            });
        }

        let ready = state
            .pending
            .get(ticket_id)
            .is_some_and(|(_, nth)| count >= *nth);
        if ready && let Some((mapping, _)) = state.pending.remove(ticket_id) {
            state
                .mappings
                .insert(ticket_id.to_string(), materialize(&mapping));
        }
        Ok(state.mappings.get(ticket_id).cloned())
    }

    async fn create(&self, mapping: &NewMapping) -> Result<TicketThreadMapping, CourierError> {
        let mut state = self.state.lock().await;
        state.creates += 1;
        if state.failing_creates > 0 {
            state.failing_creates -= 1;
            return Err(CourierError::Storage {
                source: "database is locked".into(),
            });
        }
        if let Some(winner) = state.competing.remove(&mapping.ticket_id) {
            state
                .mappings
                .insert(winner.ticket_id.clone(), materialize(&winner));
        }
        match state.mappings.get(&mapping.ticket_id) {
            Some(existing) if existing.thread_id == mapping.thread_id => Ok(existing.clone()),
            Some(existing) => Err(CourierError::MappingConflict {
                ticket_id: mapping.ticket_id.clone(),
                existing: existing.thread_id.clone(),
                requested: mapping.thread_id.clone(),
            }),
            None => {
                let created = materialize(mapping);
                state
                    .mappings
                    .insert(mapping.ticket_id.clone(), created.clone());
                Ok(created)
            }
        }
    }
}
