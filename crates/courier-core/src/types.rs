// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the queue, resolver, reconciliation and attachment stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::fingerprint;

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a [`PluginAdapter`](crate::PluginAdapter).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Storage,
    Chat,
    FileSource,
    Observability,
}

// --- Events and queue ---

/// The kinds of inbound event the pipeline understands.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    MessageCreated,
    Attachment,
    ConversationUpdated,
    ThreadCreate,
}

impl EventType {
    pub const ALL: [EventType; 4] = [
        EventType::MessageCreated,
        EventType::Attachment,
        EventType::ConversationUpdated,
        EventType::ThreadCreate,
    ];

    /// Queue priority assigned to events of this type.
    pub fn default_priority(self) -> Priority {
        match self {
            EventType::ConversationUpdated => Priority::StatusUpdate,
            EventType::Attachment => Priority::Attachment,
            EventType::MessageCreated => Priority::Message,
            EventType::ThreadCreate => Priority::Other,
        }
    }
}

/// Queue priority tier. Higher tiers are dequeued first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(into = "u8", try_from = "u8")]
pub enum Priority {
    #[default]
    Other = 0,
    Message = 1,
    Attachment = 2,
    StatusUpdate = 3,
}

impl Priority {
    pub fn level(self) -> u8 {
        self as u8
    }

    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            0 => Some(Priority::Other),
            1 => Some(Priority::Message),
            2 => Some(Priority::Attachment),
            3 => Some(Priority::StatusUpdate),
            _ => None,
        }
    }
}

impl From<Priority> for u8 {
    fn from(p: Priority) -> u8 {
        p.level()
    }
}

impl TryFrom<u8> for Priority {
    type Error = String;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        Priority::from_level(level).ok_or_else(|| format!("priority {level} is outside 0..=3"))
    }
}

/// An event received from the ticketing backend. Immutable once enqueued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub id: String,
    pub event_type: EventType,
    pub ticket_id: String,
    pub payload: serde_json::Value,
    pub priority: Priority,
    pub enqueued_at: DateTime<Utc>,
}

impl InboundEvent {
    /// Create an event with a fresh id and the default priority for its type.
    pub fn new(
        event_type: EventType,
        ticket_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_type,
            ticket_id: ticket_id.into(),
            payload,
            priority: event_type.default_priority(),
            enqueued_at: Utc::now(),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Stable dedup fingerprint: same type, ticket and normalized payload hash equal.
    pub fn fingerprint(&self) -> String {
        fingerprint::compute(self.event_type, &self.ticket_id, &self.payload)
    }
}

/// Status of a row in the active queue.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Queued,
    Processing,
}

/// Logical queue names exposed to operators and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueName {
    Events,
    Processing,
    DeadLetter,
}

impl QueueName {
    pub const ALL: [QueueName; 3] = [QueueName::Events, QueueName::Processing, QueueName::DeadLetter];

    pub fn as_str(self) -> &'static str {
        match self {
            QueueName::Events => "webhook:events",
            QueueName::Processing => "webhook:processing",
            QueueName::DeadLetter => "webhook:dead_letter",
        }
    }
}

/// An inbound event plus its delivery bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    /// Store-assigned row id; also the FIFO tiebreaker within a priority tier.
    pub id: i64,
    pub event: InboundEvent,
    pub status: QueueStatus,
    pub attempt_count: u32,
    pub first_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub available_at: DateTime<Utc>,
    pub locked_until: Option<DateTime<Utc>>,
    pub locked_by: Option<String>,
}

impl QueueEntry {
    /// Copy of this entry with one more failed attempt recorded.
    pub fn with_failure(&self, error: impl Into<String>, now: DateTime<Utc>) -> QueueEntry {
        QueueEntry {
            attempt_count: self.attempt_count + 1,
            first_attempt_at: Some(self.first_attempt_at.unwrap_or(now)),
            last_error: Some(error.into()),
            ..self.clone()
        }
    }
}

/// Result of [`EventStore::enqueue`](crate::EventStore::enqueue).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued { id: i64 },
    /// A non-expired dedup record matched; the event was dropped.
    Duplicate { fingerprint: String },
}

/// Why an entry left the active path for the dead-letter table.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeadLetterReason {
    RetriesExhausted,
    PermanentFailure,
    NoHandler,
    LeaseExpired,
}

/// A terminally failed event, kept verbatim for inspection and replay.
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetter {
    pub id: i64,
    pub event: InboundEvent,
    pub attempt_count: u32,
    pub first_attempt_at: Option<DateTime<Utc>>,
    pub final_error: String,
    pub reason: DeadLetterReason,
    pub context: serde_json::Value,
    pub dead_lettered_at: DateTime<Utc>,
}

/// Point-in-time queue statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub queued: u64,
    pub processing: u64,
    pub dead_lettered: u64,
    pub dedup_hits: u64,
    pub oldest_queued_at: Option<DateTime<Utc>>,
}

impl QueueStats {
    pub fn depth(&self, queue: QueueName) -> u64 {
        match queue {
            QueueName::Events => self.queued,
            QueueName::Processing => self.processing,
            QueueName::DeadLetter => self.dead_lettered,
        }
    }

    /// Age of the oldest queued entry relative to `now`, zero when empty.
    pub fn oldest_age(&self, now: DateTime<Utc>) -> std::time::Duration {
        self.oldest_queued_at
            .and_then(|t| (now - t).to_std().ok())
            .unwrap_or_default()
    }
}

// --- Ticket / thread mapping ---

/// Persistent link between an external ticket and its chat thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketThreadMapping {
    pub ticket_id: String,
    pub thread_id: String,
    pub discord_user_id: Option<String>,
    pub customer_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for [`MappingStore::create`](crate::MappingStore::create).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewMapping {
    pub ticket_id: String,
    pub thread_id: String,
    pub discord_user_id: Option<String>,
    pub customer_id: Option<String>,
}

// --- Chat platform ---

/// Kind of chat channel behind a handle.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    PublicThread,
    PrivateThread,
    Text,
    Forum,
    Other,
}

/// A chat-platform channel returned by `fetch_thread`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadHandle {
    pub id: String,
    pub name: Option<String>,
    pub kind: ChannelKind,
}

impl ThreadHandle {
    pub fn is_thread(&self) -> bool {
        matches!(self.kind, ChannelKind::PublicThread | ChannelKind::PrivateThread)
    }
}

/// A message already present in the thread, used by reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownMessage {
    pub id: Option<String>,
    pub content: String,
}

impl KnownMessage {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            content: content.into(),
        }
    }

    /// A message with no platform id (never eligible as a reply target).
    pub fn anonymous(content: impl Into<String>) -> Self {
        Self {
            id: None,
            content: content.into(),
        }
    }
}

/// A file ready for upload. Only produced for accepted attachments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub filename: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// A message to post into a thread: text, files, or both.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundMessage {
    pub content: Option<String>,
    pub reply_to: Option<String>,
    pub files: Vec<UploadFile>,
}

impl OutboundMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }
}

/// Identifier returned by the chat platform for a sent message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

// --- Attachments ---

/// An attachment as described by the ticketing backend. Nothing here is trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentDescriptor {
    pub url: String,
    #[serde(default)]
    pub declared_mime: Option<String>,
    #[serde(default)]
    pub declared_size: Option<u64>,
    pub filename: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn event_types_map_to_priority_tiers() {
        assert_eq!(
            EventType::ConversationUpdated.default_priority(),
            Priority::StatusUpdate
        );
        assert_eq!(EventType::Attachment.default_priority(), Priority::Attachment);
        assert_eq!(EventType::MessageCreated.default_priority(), Priority::Message);
        assert_eq!(EventType::ThreadCreate.default_priority(), Priority::Other);
        assert!(Priority::StatusUpdate > Priority::Attachment);
    }

    #[test]
    fn event_type_string_form_is_snake_case() {
        for ty in EventType::ALL {
            let s = ty.to_string();
            assert_eq!(EventType::from_str(&s).unwrap(), ty);
        }
        assert_eq!(EventType::MessageCreated.to_string(), "message_created");
        let json = serde_json::to_string(&EventType::ConversationUpdated).unwrap();
        assert_eq!(json, "\"conversation_updated\"");
    }

    #[test]
    fn priority_rejects_out_of_range_levels() {
        assert_eq!(Priority::from_level(2), Some(Priority::Attachment));
        assert!(serde_json::from_str::<Priority>("7").is_err());
        assert_eq!(serde_json::to_string(&Priority::Message).unwrap(), "1");
    }

    #[test]
    fn queue_names_match_wire_identifiers() {
        let names: Vec<&str> = QueueName::ALL.iter().map(|q| q.as_str()).collect();
        assert_eq!(
            names,
            ["webhook:events", "webhook:processing", "webhook:dead_letter"]
        );
    }

    #[test]
    fn with_failure_keeps_first_attempt_timestamp() {
        let t0 = Utc::now();
        let entry = QueueEntry {
            id: 1,
            event: InboundEvent::new(EventType::MessageCreated, "T-1", serde_json::json!({})),
            status: QueueStatus::Processing,
            attempt_count: 0,
            first_attempt_at: Some(t0),
            last_error: None,
            available_at: t0,
            locked_until: None,
            locked_by: None,
        };
        let later = t0 + chrono::Duration::seconds(30);
        let failed = entry.with_failure("boom", later).with_failure("again", later);
        assert_eq!(failed.attempt_count, 2);
        assert_eq!(failed.first_attempt_at, Some(t0));
        assert_eq!(failed.last_error.as_deref(), Some("again"));
    }

    #[test]
    fn only_thread_kinds_count_as_threads() {
        let handle = |kind| ThreadHandle {
            id: "1".into(),
            name: None,
            kind,
        };
        assert!(handle(ChannelKind::PublicThread).is_thread());
        assert!(handle(ChannelKind::PrivateThread).is_thread());
        assert!(!handle(ChannelKind::Text).is_thread());
        assert!(!handle(ChannelKind::Forum).is_thread());
    }

    #[test]
    fn stats_oldest_age_is_zero_when_empty() {
        let stats = QueueStats::default();
        assert_eq!(stats.oldest_age(Utc::now()), std::time::Duration::ZERO);
        assert_eq!(stats.depth(QueueName::DeadLetter), 0);
    }
}
