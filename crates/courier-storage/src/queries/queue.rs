// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Active queue operations: enqueue with dedup, claims, ack, requeue,
//! lease recovery and statistics.
//!
//! Every function takes `now` explicitly so the adapter's clock decides
//! what "ready" and "expired" mean.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Transaction, TransactionBehavior, params};

use courier_core::CourierError;
use courier_core::types::{
    DeadLetterReason, EnqueueOutcome, InboundEvent, QueueEntry, QueueStats, QueueStatus,
};

use crate::codec::{add_delay, enum_col, event_cols, fmt_ts, opt_ts_col, ts_col};
use crate::database::{Database, map_tr_err};
use crate::queries::dead_letters;

pub(crate) const ENTRY_COLUMNS: &str = "id, event_id, event_type, ticket_id, payload, priority, \
     enqueued_at, status, attempt_count, first_attempt_at, last_error, available_at, \
     locked_until, locked_by";

pub(crate) fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<QueueEntry> {
    let status: QueueStatus = enum_col(row, 7)?;
    Ok(QueueEntry {
        id: row.get(0)?,
        event: event_cols(row, 1)?,
        status,
        attempt_count: row.get(8)?,
        first_attempt_at: opt_ts_col(row, 9)?,
        last_error: row.get(10)?,
        available_at: ts_col(row, 11)?,
        locked_until: opt_ts_col(row, 12)?,
        locked_by: row.get(13)?,
    })
}

/// Insert a fresh queue row for `event`. Shared with dead-letter replay.
pub(crate) fn insert_event(
    tx: &Transaction<'_>,
    event: &InboundEvent,
    now: DateTime<Utc>,
) -> rusqlite::Result<i64> {
    tx.execute(
        "INSERT INTO event_queue (event_id, event_type, ticket_id, payload, priority,
                                  enqueued_at, fingerprint, status, available_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'queued', ?8)",
        params![
            event.id,
            event.event_type.to_string(),
            event.ticket_id,
            event.payload.to_string(),
            event.priority.level(),
            fmt_ts(event.enqueued_at),
            event.fingerprint(),
            fmt_ts(now),
        ],
    )?;
    Ok(tx.last_insert_rowid())
}

/// Enqueue `event` unless a live dedup record matches its fingerprint.
///
/// The dedup check, the counter bump or the insert, and the new dedup record
/// all happen in one immediate transaction.
pub async fn enqueue(
    db: &Database,
    event: &InboundEvent,
    now: DateTime<Utc>,
    dedup_ttl: Duration,
) -> Result<EnqueueOutcome, CourierError> {
    let event = event.clone();
    db.connection()
        .call(move |conn| {
            let fingerprint = event.fingerprint();
            let now_s = fmt_ts(now);
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let live: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM dedup_records WHERE fingerprint = ?1 AND expires_at > ?2",
                    params![fingerprint, now_s],
                    |row| row.get(0),
                )
                .optional()?;

            let outcome = if live.is_some() {
                tx.execute(
                    "UPDATE queue_counters SET value = value + 1 WHERE name = 'dedup_hits'",
                    [],
                )?;
                EnqueueOutcome::Duplicate { fingerprint }
            } else {
                // An expired record may still be present until the next purge.
                tx.execute(
                    "INSERT OR REPLACE INTO dedup_records (fingerprint, expires_at)
                     VALUES (?1, ?2)",
                    params![fingerprint, fmt_ts(add_delay(now, dedup_ttl))],
                )?;
                let id = insert_event(&tx, &event, now)?;
                EnqueueOutcome::Enqueued { id }
            };

            tx.commit()?;
            Ok(outcome)
        })
        .await
        .map_err(map_tr_err)
}

/// Move one queued entry to processing. Returns `None` if it was not queued.
fn claim(
    tx: &Transaction<'_>,
    id: i64,
    consumer: &str,
    now: DateTime<Utc>,
    lease: Duration,
) -> rusqlite::Result<Option<QueueEntry>> {
    let changed = tx.execute(
        "UPDATE event_queue
         SET status = 'processing',
             locked_until = ?2,
             locked_by = ?3,
             first_attempt_at = COALESCE(first_attempt_at, ?4)
         WHERE id = ?1 AND status = 'queued'",
        params![id, fmt_ts(add_delay(now, lease)), consumer, fmt_ts(now)],
    )?;
    if changed == 0 {
        return Ok(None);
    }
    tx.query_row(
        &format!("SELECT {ENTRY_COLUMNS} FROM event_queue WHERE id = ?1"),
        params![id],
        row_to_entry,
    )
    .optional()
}

/// Claim the next ready entry: highest priority first, then lowest id.
pub async fn dequeue(
    db: &Database,
    consumer: &str,
    now: DateTime<Utc>,
    lease: Duration,
) -> Result<Option<QueueEntry>, CourierError> {
    let consumer = consumer.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let next: Option<i64> = tx
                .query_row(
                    "SELECT id FROM event_queue
                     WHERE status = 'queued' AND available_at <= ?1
                     ORDER BY priority DESC, id ASC
                     LIMIT 1",
                    params![fmt_ts(now)],
                    |row| row.get(0),
                )
                .optional()?;

            let entry = match next {
                Some(id) => claim(&tx, id, &consumer, now, lease)?,
                None => None,
            };
            tx.commit()?;
            Ok(entry)
        })
        .await
        .map_err(map_tr_err)
}

/// Compare-and-set a specific entry from queued to processing.
pub async fn move_to_processing(
    db: &Database,
    id: i64,
    consumer: &str,
    now: DateTime<Utc>,
    lease: Duration,
) -> Result<Option<QueueEntry>, CourierError> {
    let consumer = consumer.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let entry = claim(&tx, id, &consumer, now, lease)?;
            tx.commit()?;
            Ok(entry)
        })
        .await
        .map_err(map_tr_err)
}

/// Remove a processed entry. Returns `false` when `entry` is no longer
/// held by the consumer that claimed it.
pub async fn ack(db: &Database, entry: &QueueEntry) -> Result<bool, CourierError> {
    let id = entry.id;
    let owner = entry.locked_by.clone();
    db.connection()
        .call(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM event_queue
                 WHERE id = ?1 AND status = 'processing' AND locked_by IS ?2",
                params![id, owner],
            )?;
            Ok(deleted > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Persist the caller's retry bookkeeping and make the entry visible again
/// after `delay`. Returns `false` when `entry` is no longer held by the
/// consumer that claimed it.
pub async fn requeue(
    db: &Database,
    entry: &QueueEntry,
    now: DateTime<Utc>,
    delay: Duration,
) -> Result<bool, CourierError> {
    let id = entry.id;
    let owner = entry.locked_by.clone();
    let attempt_count = entry.attempt_count;
    let first_attempt_at = entry.first_attempt_at.map(fmt_ts);
    let last_error = entry.last_error.clone();
    let available_at = fmt_ts(add_delay(now, delay));
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE event_queue
                 SET status = 'queued',
                     attempt_count = ?3,
                     first_attempt_at = ?4,
                     last_error = ?5,
                     available_at = ?6,
                     locked_until = NULL,
                     locked_by = NULL
                 WHERE id = ?1 AND status = 'processing' AND locked_by IS ?2",
                params![id, owner, attempt_count, first_attempt_at, last_error, available_at],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Outcome of one recovery sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub requeued: usize,
    pub dead_lettered: usize,
}

impl RecoveryReport {
    pub fn total(&self) -> usize {
        self.requeued + self.dead_lettered
    }
}

/// Return expired processing leases to the queue.
///
/// The lost attempt is counted; an entry that reaches `max_retries` this way
/// is dead-lettered with reason `lease_expired`.
pub async fn recover_expired(
    db: &Database,
    now: DateTime<Utc>,
    max_retries: u32,
) -> Result<RecoveryReport, CourierError> {
    db.connection()
        .call(move |conn| {
            let now_s = fmt_ts(now);
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let expired: Vec<QueueEntry> = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {ENTRY_COLUMNS} FROM event_queue
                     WHERE status = 'processing' AND locked_until <= ?1
                     ORDER BY id ASC"
                ))?;
                stmt.query_map(params![now_s], row_to_entry)?
                    .collect::<rusqlite::Result<_>>()?
            };

            let mut report = RecoveryReport::default();
            for entry in expired {
                let lost = entry.with_failure("processing lease expired", now);
                if lost.attempt_count >= max_retries {
                    let context = serde_json::json!({
                        "attempts_made": lost.attempt_count,
                        "locked_by": entry.locked_by,
                        "lease_expired_at": entry.locked_until.map(fmt_ts),
                        "likely_cause": "consumer stopped while holding the entry",
                    });
                    if dead_letters::move_entry(
                        &tx,
                        &lost,
                        DeadLetterReason::LeaseExpired,
                        &context,
                        now,
                    )?
                    .is_some()
                    {
                        report.dead_lettered += 1;
                    }
                } else {
                    tx.execute(
                        "UPDATE event_queue
                         SET status = 'queued',
                             attempt_count = ?2,
                             first_attempt_at = ?3,
                             last_error = ?4,
                             available_at = ?5,
                             locked_until = NULL,
                             locked_by = NULL
                         WHERE id = ?1",
                        params![
                            lost.id,
                            lost.attempt_count,
                            lost.first_attempt_at.map(fmt_ts),
                            lost.last_error,
                            now_s,
                        ],
                    )?;
                    report.requeued += 1;
                }
            }

            tx.commit()?;
            Ok(report)
        })
        .await
        .map_err(map_tr_err)
}

/// Queue depth, dead-letter count, dedup hits and oldest queued entry.
pub async fn stats(db: &Database) -> Result<QueueStats, CourierError> {
    db.connection()
        .call(|conn| {
            let (queued, processing, oldest): (i64, i64, Option<String>) = conn.query_row(
                "SELECT
                     COALESCE(SUM(status = 'queued'), 0),
                     COALESCE(SUM(status = 'processing'), 0),
                     MIN(CASE WHEN status = 'queued' THEN enqueued_at END)
                 FROM event_queue",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;
            let dead_lettered: i64 =
                conn.query_row("SELECT COUNT(*) FROM dead_letters", [], |row| row.get(0))?;
            let dedup_hits: i64 = conn
                .query_row(
                    "SELECT value FROM queue_counters WHERE name = 'dedup_hits'",
                    [],
                    |row| row.get(0),
                )
                .optional()?
                .unwrap_or(0);

            Ok(QueueStats {
                queued: queued as u64,
                processing: processing as u64,
                dead_lettered: dead_lettered as u64,
                dedup_hits: dedup_hits as u64,
                oldest_queued_at: oldest
                    .map(|raw| crate::codec::parse_ts(2, &raw))
                    .transpose()?,
            })
        })
        .await
        .map_err(map_tr_err)
}

/// Delete dedup records whose TTL has elapsed.
pub async fn purge_expired_dedup(db: &Database, now: DateTime<Utc>) -> Result<usize, CourierError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "DELETE FROM dedup_records WHERE expires_at <= ?1",
                params![fmt_ts(now)],
            )
        })
        .await
        .map_err(map_tr_err)
}
