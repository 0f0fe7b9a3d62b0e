// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ticket-to-thread mapping persistence.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, TransactionBehavior, params};

use courier_core::CourierError;
use courier_core::types::{NewMapping, TicketThreadMapping};

use crate::codec::{fmt_ts, ts_col};
use crate::database::{Database, map_tr_err};

fn row_to_mapping(row: &rusqlite::Row<'_>) -> rusqlite::Result<TicketThreadMapping> {
    Ok(TicketThreadMapping {
        ticket_id: row.get(0)?,
        thread_id: row.get(1)?,
        discord_user_id: row.get(2)?,
        customer_id: row.get(3)?,
        created_at: ts_col(row, 4)?,
        updated_at: ts_col(row, 5)?,
    })
}

const SELECT_MAPPING: &str = "SELECT ticket_id, thread_id, discord_user_id, customer_id, \
     created_at, updated_at FROM ticket_thread_mappings WHERE ticket_id = ?1";

pub async fn get_by_ticket_id(
    db: &Database,
    ticket_id: &str,
) -> Result<Option<TicketThreadMapping>, CourierError> {
    let ticket_id = ticket_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(SELECT_MAPPING, params![ticket_id], row_to_mapping)
                .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Result of an insert attempt; the caller decides whether `Existing` conflicts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertResult {
    Created(TicketThreadMapping),
    Existing(TicketThreadMapping),
}

/// Insert a mapping unless one already exists for the ticket.
pub async fn insert(
    db: &Database,
    mapping: &NewMapping,
    now: DateTime<Utc>,
) -> Result<InsertResult, CourierError> {
    let mapping = mapping.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            if let Some(existing) = tx
                .query_row(SELECT_MAPPING, params![mapping.ticket_id], row_to_mapping)
                .optional()?
            {
                return Ok(InsertResult::Existing(existing));
            }

            let now_s = fmt_ts(now);
            tx.execute(
                "INSERT INTO ticket_thread_mappings
                     (ticket_id, thread_id, discord_user_id, customer_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![
                    mapping.ticket_id,
                    mapping.thread_id,
                    mapping.discord_user_id,
                    mapping.customer_id,
                    now_s,
                ],
            )?;
            let created = tx.query_row(SELECT_MAPPING, params![mapping.ticket_id], row_to_mapping)?;
            tx.commit()?;
            Ok(InsertResult::Created(created))
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn new_mapping(ticket: &str, thread: &str) -> NewMapping {
        NewMapping {
            ticket_id: ticket.into(),
            thread_id: thread.into(),
            discord_user_id: Some("u-1".into()),
            customer_id: None,
        }
    }

    #[tokio::test]
    async fn insert_then_get() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("m.db").to_str().unwrap())
            .await
            .unwrap();
        let now = Utc::now();

        assert!(get_by_ticket_id(&db, "T-1").await.unwrap().is_none());
        let created = insert(&db, &new_mapping("T-1", "th-1"), now).await.unwrap();
        let InsertResult::Created(created) = created else {
            panic!("expected Created");
        };
        assert_eq!(created.thread_id, "th-1");
        assert_eq!(created.discord_user_id.as_deref(), Some("u-1"));
        assert_eq!(created.created_at, created.updated_at);

        let fetched = get_by_ticket_id(&db, "T-1").await.unwrap().unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn second_insert_returns_existing_row_untouched() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("m.db").to_str().unwrap())
            .await
            .unwrap();
        let now = Utc::now();
        insert(&db, &new_mapping("T-1", "th-1"), now).await.unwrap();

        let again = insert(&db, &new_mapping("T-1", "th-2"), now).await.unwrap();
        match again {
            InsertResult::Existing(existing) => assert_eq!(existing.thread_id, "th-1"),
            other => panic!("expected Existing, got {other:?}"),
        }
    }
}
