// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event store trait: priority queue with dedup and dead-letter semantics.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::CourierError;
use crate::types::{
    DeadLetter, DeadLetterReason, EnqueueOutcome, InboundEvent, QueueEntry, QueueStats,
};

/// Durable, priority-ordered holding area for inbound events.
///
/// Implementations must make `enqueue` (dedup check + insert) and
/// `dequeue`/`move_to_processing` atomic with respect to concurrent
/// consumers; callers never lock around them.
///
/// `ack`, `requeue_with_delay` and `dead_letter` only apply to an entry still
/// in processing under the consumer named in its `locked_by`. Anything else
/// fails with [`CourierError::LeaseLost`] and changes nothing.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Insert an event unless a live dedup record matches its fingerprint.
    async fn enqueue(&self, event: &InboundEvent) -> Result<EnqueueOutcome, CourierError>;

    /// Claim the next ready entry: highest priority first, FIFO within a tier.
    async fn dequeue(&self, consumer: &str) -> Result<Option<QueueEntry>, CourierError>;

    /// Claim one specific queued entry. `None` if it is not claimable.
    async fn move_to_processing(
        &self,
        id: i64,
        consumer: &str,
    ) -> Result<Option<QueueEntry>, CourierError>;

    /// Remove a processed entry from the active path.
    async fn ack(&self, entry: &QueueEntry) -> Result<(), CourierError>;

    /// Return an entry to the queue, visible again after `delay`.
    ///
    /// Persists the entry's `attempt_count`, `first_attempt_at` and
    /// `last_error` as updated by the dispatcher.
    async fn requeue_with_delay(
        &self,
        entry: &QueueEntry,
        delay: Duration,
    ) -> Result<(), CourierError>;

    /// Move an entry verbatim into the dead-letter area.
    async fn dead_letter(
        &self,
        entry: &QueueEntry,
        reason: DeadLetterReason,
        context: serde_json::Value,
    ) -> Result<(), CourierError>;

    /// Return entries whose processing lease expired to the queue.
    /// Returns the number of entries touched.
    async fn recover_expired(&self) -> Result<usize, CourierError>;

    /// Queue depths and age of the oldest entry.
    async fn stats(&self) -> Result<QueueStats, CourierError>;

    /// Most recent dead letters first.
    async fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetter>, CourierError>;

    /// Put a dead-lettered event back on the queue with a fresh attempt budget.
    /// Returns the new queue id, or `None` if no such dead letter exists.
    async fn replay_dead_letter(&self, id: i64) -> Result<Option<i64>, CourierError>;

    /// Delete expired dedup records. Returns the number removed.
    async fn purge_expired_dedup(&self) -> Result<usize, CourierError>;
}
