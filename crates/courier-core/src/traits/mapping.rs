// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ticket-to-thread mapping persistence.

use async_trait::async_trait;

use crate::error::CourierError;
use crate::types::{NewMapping, TicketThreadMapping};

/// Narrow persistence interface for [`TicketThreadMapping`] records.
#[async_trait]
pub trait MappingStore: Send + Sync {
    /// Fetch the mapping for a ticket. `Ok(None)` when none exists yet.
    async fn get_by_ticket_id(
        &self,
        ticket_id: &str,
    ) -> Result<Option<TicketThreadMapping>, CourierError>;

    /// Persist a mapping. Write-once: repeating the same pair returns the
    /// stored record, a different thread id is a
    /// [`CourierError::MappingConflict`].
    async fn create(&self, mapping: &NewMapping) -> Result<TicketThreadMapping, CourierError>;
}
