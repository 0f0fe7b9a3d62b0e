// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dead-letter table: terminal failures kept verbatim for inspection and replay.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Transaction, TransactionBehavior, params};

use courier_core::CourierError;
use courier_core::types::{DeadLetter, DeadLetterReason, QueueEntry};

use crate::codec::{enum_col, event_cols, fmt_ts, json_col, opt_ts_col, ts_col};
use crate::database::{Database, map_tr_err};
use crate::queries::queue::insert_event;

const DEAD_LETTER_COLUMNS: &str = "id, event_id, event_type, ticket_id, payload, priority, \
     enqueued_at, attempt_count, first_attempt_at, final_error, reason, context, dead_lettered_at";

fn row_to_dead_letter(row: &rusqlite::Row<'_>) -> rusqlite::Result<DeadLetter> {
    let reason: DeadLetterReason = enum_col(row, 10)?;
    Ok(DeadLetter {
        id: row.get(0)?,
        event: event_cols(row, 1)?,
        attempt_count: row.get(7)?,
        first_attempt_at: opt_ts_col(row, 8)?,
        final_error: row.get(9)?,
        reason,
        context: json_col(row, 11)?,
        dead_lettered_at: ts_col(row, 12)?,
    })
}

/// Copy `entry` into `dead_letters` and delete it from the active queue.
///
/// Returns `None`, writing nothing, when `entry` is no longer in processing
/// under the consumer that claimed it.
pub(crate) fn move_entry(
    tx: &Transaction<'_>,
    entry: &QueueEntry,
    reason: DeadLetterReason,
    context: &serde_json::Value,
    now: DateTime<Utc>,
) -> rusqlite::Result<Option<i64>> {
    let removed = tx.execute(
        "DELETE FROM event_queue
         WHERE id = ?1 AND status = 'processing' AND locked_by IS ?2",
        params![entry.id, entry.locked_by],
    )?;
    if removed == 0 {
        return Ok(None);
    }

    let event = &entry.event;
    tx.execute(
        "INSERT INTO dead_letters (event_id, event_type, ticket_id, payload, priority,
                                   enqueued_at, attempt_count, first_attempt_at,
                                   final_error, reason, context, dead_lettered_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            event.id,
            event.event_type.to_string(),
            event.ticket_id,
            event.payload.to_string(),
            event.priority.level(),
            fmt_ts(event.enqueued_at),
            entry.attempt_count,
            entry.first_attempt_at.map(fmt_ts),
            entry.last_error.clone().unwrap_or_default(),
            reason.to_string(),
            context.to_string(),
            fmt_ts(now),
        ],
    )?;
    Ok(Some(tx.last_insert_rowid()))
}

/// Move an entry to the dead-letter table. Returns the dead letter id, or
/// `None` if the caller no longer holds the entry.
pub async fn insert(
    db: &Database,
    entry: &QueueEntry,
    reason: DeadLetterReason,
    context: serde_json::Value,
    now: DateTime<Utc>,
) -> Result<Option<i64>, CourierError> {
    let entry = entry.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let id = move_entry(&tx, &entry, reason, &context, now)?;
            tx.commit()?;
            Ok(id)
        })
        .await
        .map_err(map_tr_err)
}

/// Most recent dead letters first.
pub async fn list(db: &Database, limit: usize) -> Result<Vec<DeadLetter>, CourierError> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {DEAD_LETTER_COLUMNS} FROM dead_letters ORDER BY id DESC LIMIT ?1"
            ))?;
            let rows = stmt
                .query_map(params![limit], row_to_dead_letter)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Re-insert a dead-lettered event with a fresh attempt budget.
///
/// Dedup is bypassed. Returns the new queue id, or `None` if `id` is unknown.
pub async fn replay(
    db: &Database,
    id: i64,
    now: DateTime<Utc>,
) -> Result<Option<i64>, CourierError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let letter = tx
                .query_row(
                    &format!("SELECT {DEAD_LETTER_COLUMNS} FROM dead_letters WHERE id = ?1"),
                    params![id],
                    row_to_dead_letter,
                )
                .optional()?;

            let Some(letter) = letter else {
                return Ok(None);
            };

            let queue_id = insert_event(&tx, &letter.event, now)?;
            tx.execute("DELETE FROM dead_letters WHERE id = ?1", params![id])?;
            tx.commit()?;
            Ok(Some(queue_id))
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::queries::queue;
    use courier_core::types::{EnqueueOutcome, EventType, InboundEvent};
    use serde_json::json;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("dl.db").to_str().unwrap())
            .await
            .unwrap();
        (db, dir)
    }

    async fn claimed(db: &Database, ticket: &str, now: DateTime<Utc>) -> QueueEntry {
        let ev = InboundEvent::new(EventType::Attachment, ticket, json!({"url": "https://x/a.png"}));
        let outcome = queue::enqueue(db, &ev, now, Duration::from_secs(300))
            .await
            .unwrap();
        assert!(matches!(outcome, EnqueueOutcome::Enqueued { .. }));
        queue::dequeue(db, "w", now, Duration::from_secs(300))
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn dead_letter_keeps_event_verbatim() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();
        let entry = claimed(&db, "T-1", now).await.with_failure("mime mismatch", now);

        insert(
            &db,
            &entry,
            DeadLetterReason::PermanentFailure,
            json!({"error_class": "validation"}),
            now,
        )
        .await
        .unwrap();

        let letters = list(&db, 10).await.unwrap();
        assert_eq!(letters.len(), 1);
        let letter = &letters[0];
        assert_eq!(letter.event.id, entry.event.id);
        assert_eq!(letter.event.payload, entry.event.payload);
        assert_eq!(letter.final_error, "mime mismatch");
        assert_eq!(letter.attempt_count, 1);
        assert_eq!(letter.context["error_class"], "validation");
        assert_eq!(queue::stats(&db).await.unwrap().processing, 0);
    }

    #[tokio::test]
    async fn list_is_newest_first_and_limited() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();
        for ticket in ["T-1", "T-2", "T-3"] {
            let entry = claimed(&db, ticket, now).await;
            insert(&db, &entry, DeadLetterReason::NoHandler, json!({}), now)
                .await
                .unwrap();
        }
        let letters = list(&db, 2).await.unwrap();
        let tickets: Vec<&str> = letters.iter().map(|l| l.event.ticket_id.as_str()).collect();
        assert_eq!(tickets, ["T-3", "T-2"]);
    }

    #[tokio::test]
    async fn replay_requeues_with_fresh_budget_despite_dedup() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();
        let entry = claimed(&db, "T-1", now)
            .await
            .with_failure("a", now)
            .with_failure("b", now);
        let dl_id = insert(&db, &entry, DeadLetterReason::RetriesExhausted, json!({}), now)
            .await
            .unwrap()
            .expect("entry was held");

        // Dedup record from the original enqueue is still live.
        let queue_id = replay(&db, dl_id, now).await.unwrap().expect("replayed");
        let again = queue::dequeue(&db, "w", now, Duration::from_secs(300))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(again.id, queue_id);
        assert_eq!(again.attempt_count, 0);
        assert!(again.last_error.is_none());
        assert_eq!(again.event.id, entry.event.id);

        assert!(list(&db, 10).await.unwrap().is_empty());
        assert_eq!(replay(&db, dl_id, now).await.unwrap(), None);
    }

    #[tokio::test]
    async fn entry_held_by_another_consumer_is_not_dead_lettered() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();
        let entry = claimed(&db, "T-1", now).await;
        let impostor = QueueEntry {
            locked_by: Some("someone-else".into()),
            ..entry.with_failure("late", now)
        };

        let moved = insert(&db, &impostor, DeadLetterReason::PermanentFailure, json!({}), now)
            .await
            .unwrap();
        assert_eq!(moved, None);
        assert!(list(&db, 10).await.unwrap().is_empty());
        assert_eq!(queue::stats(&db).await.unwrap().processing, 1);
    }
}
