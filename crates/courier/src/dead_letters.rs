// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `courier dead-letters` command implementations.

use courier_core::types::DeadLetter;
use courier_core::{CourierError, EventStore};

/// One line per dead letter: id, reason, type, ticket, attempts, error.
pub fn format_dead_letter(letter: &DeadLetter) -> String {
    format!(
        "{:>6}  {:<18} {:<22} {:<14} attempts={} at={}  {}",
        letter.id,
        letter.reason.to_string(),
        letter.event.event_type.to_string(),
        letter.event.ticket_id,
        letter.attempt_count,
        letter.dead_lettered_at.format("%Y-%m-%d %H:%M:%S"),
        letter.final_error,
    )
}

pub async fn run_list(store: &dyn EventStore, limit: usize) -> Result<(), CourierError> {
    let letters = store.list_dead_letters(limit).await?;
    if letters.is_empty() {
        println!("no dead letters");
        return Ok(());
    }
    for letter in &letters {
        println!("{}", format_dead_letter(letter));
        if !letter.context.is_null() {
            println!("        context: {}", letter.context);
        }
    }
    Ok(())
}

pub async fn run_replay(store: &dyn EventStore, id: i64) -> Result<(), CourierError> {
    match store.replay_dead_letter(id).await? {
        Some(queue_id) => {
            println!("dead letter {id} requeued as entry {queue_id}");
            Ok(())
        }
        None => Err(CourierError::Internal(format!("no dead letter with id {id}"))),
    }
}
