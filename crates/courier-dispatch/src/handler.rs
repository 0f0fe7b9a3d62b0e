// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event handler trait and the typed outcome the dispatcher acts on.

use async_trait::async_trait;

use courier_core::types::InboundEvent;
use courier_core::{CourierError, ErrorClass};

/// What a handler wants done with the entry it was given.
#[derive(Debug)]
pub enum HandlerOutcome {
    /// Processed; acknowledge and forget.
    Done,
    /// Transient failure; requeue with backoff until the retry bound.
    Retry(CourierError),
    /// Permanent failure; dead-letter immediately.
    Reject(CourierError),
}

impl HandlerOutcome {
    /// Map an error to an outcome by its [`ErrorClass`].
    pub fn from_error(err: CourierError) -> Self {
        match err.class() {
            ErrorClass::Transient => HandlerOutcome::Retry(err),
            ErrorClass::Validation | ErrorClass::Terminal | ErrorClass::Exhausted => {
                HandlerOutcome::Reject(err)
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            HandlerOutcome::Done => "done",
            HandlerOutcome::Retry(_) => "retry",
            HandlerOutcome::Reject(_) => "reject",
        }
    }
}

impl From<Result<(), CourierError>> for HandlerOutcome {
    fn from(result: Result<(), CourierError>) -> Self {
        match result {
            Ok(()) => HandlerOutcome::Done,
            Err(err) => HandlerOutcome::from_error(err),
        }
    }
}

/// Processes one kind of inbound event.
///
/// Handlers must be idempotent: an entry may be delivered again after a
/// requeue or a lease recovery.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &InboundEvent) -> HandlerOutcome;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn outcome_follows_error_class() {
        let transient = CourierError::Timeout {
            duration: Duration::from_secs(15),
        };
        assert!(matches!(
            HandlerOutcome::from_error(transient),
            HandlerOutcome::Retry(_)
        ));

        let invalid = CourierError::invalid_payload("attachment", "missing url");
        assert!(matches!(
            HandlerOutcome::from_error(invalid),
            HandlerOutcome::Reject(_)
        ));

        let not_thread = CourierError::NotAThread {
            ticket_id: "T".into(),
            thread_id: "c".into(),
        };
        assert!(matches!(
            HandlerOutcome::from(Err(not_thread)),
            HandlerOutcome::Reject(_)
        ));
        assert!(matches!(HandlerOutcome::from(Ok(())), HandlerOutcome::Done));
    }
}
