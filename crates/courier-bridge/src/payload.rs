// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed event payloads.

use serde::Deserialize;
use serde::de::DeserializeOwned;

use courier_core::types::AttachmentDescriptor;
use courier_core::{CourierError, InboundEvent};

/// `message_created`: a plain-text message from the ticketing side.
#[derive(Debug, Clone, Deserialize)]
pub struct MessagePayload {
    pub content: String,
}

/// `attachment`: files to deliver, with an optional caption.
#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentPayload {
    pub attachments: Vec<AttachmentDescriptor>,
    #[serde(default)]
    pub caption: Option<String>,
}

/// `conversation_updated`: the ticket's status changed.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusPayload {
    pub status: String,
    #[serde(default)]
    pub note: Option<String>,
}

/// `thread_create`: open the thread for a new ticket.
#[derive(Debug, Clone, Deserialize)]
pub struct ThreadCreatePayload {
    pub parent_channel_id: String,
    pub title: String,
    #[serde(default)]
    pub discord_user_id: Option<String>,
    #[serde(default)]
    pub customer_id: Option<String>,
}

/// Deserialize an event's payload, reporting failures as
/// [`CourierError::InvalidPayload`].
pub fn parse<T: DeserializeOwned>(event: &InboundEvent) -> Result<T, CourierError> {
    serde_json::from_value(event.payload.clone())
        .map_err(|e| CourierError::invalid_payload(event.event_type, e))
}
