// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Courier event pipeline.
//!
//! Every error carries an [`ErrorClass`] so the dispatcher can decide between
//! retry, dead-letter and immediate surfacing without inspecting message text.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

/// How the dispatcher should treat a failure.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Network timeouts, mapping races, upload failures. Retried with backoff.
    Transient,
    /// Bad signatures, MIME conflicts, malformed payloads. Never retried.
    Validation,
    /// Permissions, missing threads, conflicting mappings. Surfaced immediately.
    Terminal,
    /// Retry budget consumed.
    Exhausted,
}

/// Diagnostic context attached when the mapping resolver gives up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveFailure {
    pub ticket_id: String,
    pub attempts_made: u32,
    #[serde(with = "duration_ms")]
    pub total_retry_time: Duration,
    /// `true` when the retries finished well inside the configured window,
    /// which points at the creation/mapping race rather than an outage.
    pub likely_race_condition: bool,
    pub original_error: String,
}

impl fmt::Display for ResolveFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "no thread mapping for ticket {} after {} attempt(s) in {:?}: {}",
            self.ticket_id, self.attempts_made, self.total_retry_time, self.original_error
        )
    }
}

/// The primary error type used across Courier crates.
#[derive(Debug, Error)]
pub enum CourierError {
    /// Configuration errors (invalid TOML, missing required fields, bad limits).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Chat platform API errors.
    #[error("chat platform error: {message}")]
    Chat {
        message: String,
        /// Whether the platform signalled a retryable condition (rate limit, 5xx).
        retryable: bool,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Remote attachment download failure.
    #[error("download failed for {url}: {message}")]
    Download {
        url: String,
        message: String,
        /// Connection failures, 5xx and 429 may succeed later. Refused URLs
        /// and other HTTP errors will not.
        retryable: bool,
    },

    /// Batched attachment upload failure.
    #[error("upload failed: {message}")]
    Upload { message: String },

    /// The ticket has no thread mapping yet and the retry budget ran out.
    #[error("{0}")]
    MappingUnavailable(Box<ResolveFailure>),

    /// The mapped thread does not exist on the chat platform.
    #[error("thread {thread_id} mapped to ticket {ticket_id} was not found")]
    ThreadNotFound { ticket_id: String, thread_id: String },

    /// The mapped channel exists but is not a thread.
    #[error("channel {thread_id} mapped to ticket {ticket_id} is not a thread")]
    NotAThread { ticket_id: String, thread_id: String },

    /// A second, different thread was offered for an already-mapped ticket.
    #[error("ticket {ticket_id} is already mapped to thread {existing}, refusing {requested}")]
    MappingConflict {
        ticket_id: String,
        existing: String,
        requested: String,
    },

    /// The event payload did not match the schema for its type.
    #[error("invalid {event_type} payload: {message}")]
    InvalidPayload { event_type: String, message: String },

    /// The consumer's processing lease on a queue entry was lost, so it may
    /// no longer ack, requeue or dead-letter it.
    #[error("queue entry {entry_id} is no longer held by {consumer}")]
    LeaseLost { entry_id: i64, consumer: String },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CourierError {
    /// Classify this error for retry decisions.
    pub fn class(&self) -> ErrorClass {
        match self {
            CourierError::Storage { .. }
            | CourierError::Upload { .. }
            | CourierError::MappingUnavailable(_)
            | CourierError::Timeout { .. } => ErrorClass::Transient,
            CourierError::Chat { retryable, .. } | CourierError::Download { retryable, .. } => {
                if *retryable {
                    ErrorClass::Transient
                } else {
                    ErrorClass::Terminal
                }
            }
            CourierError::InvalidPayload { .. } => ErrorClass::Validation,
            CourierError::Config(_)
            | CourierError::ThreadNotFound { .. }
            | CourierError::NotAThread { .. }
            | CourierError::MappingConflict { .. }
            | CourierError::LeaseLost { .. }
            | CourierError::Internal(_) => ErrorClass::Terminal,
        }
    }

    /// Shorthand for `self.class() == ErrorClass::Transient`.
    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    /// Build an [`CourierError::InvalidPayload`] from any displayable cause.
    pub fn invalid_payload(event_type: impl fmt::Display, cause: impl fmt::Display) -> Self {
        CourierError::InvalidPayload {
            event_type: event_type.to_string(),
            message: cause.to_string(),
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
