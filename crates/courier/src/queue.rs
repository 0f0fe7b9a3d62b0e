// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `courier recover` and `courier enqueue`.

use std::sync::Arc;

use tracing::info;

use courier_config::CourierConfig;
use courier_core::types::EnqueueOutcome;
use courier_core::{CourierError, EventStore, EventType, InboundEvent, TokioScheduler};
use courier_dispatch::{Dispatcher, DispatcherOptions, SweepReport};

pub async fn recover(
    config: &CourierConfig,
    store: Arc<dyn EventStore>,
) -> Result<SweepReport, CourierError> {
    let dispatcher = Dispatcher::new(
        store,
        Arc::new(TokioScheduler),
        DispatcherOptions::from_config(config),
    );
    dispatcher.sweep().await
}

pub async fn run_recover(
    config: &CourierConfig,
    store: Arc<dyn EventStore>,
) -> Result<(), CourierError> {
    let report = recover(config, store).await?;
    println!(
        "recovered {} expired lease(s), purged {} dedup record(s)",
        report.recovered, report.dedup_purged
    );
    Ok(())
}

pub async fn enqueue(
    store: &dyn EventStore,
    event_type: EventType,
    ticket_id: &str,
    payload: &str,
) -> Result<EnqueueOutcome, CourierError> {
    let payload: serde_json::Value = serde_json::from_str(payload)
        .map_err(|e| CourierError::invalid_payload(event_type, e))?;
    let event = InboundEvent::new(event_type, ticket_id, payload);
    let outcome = store.enqueue(&event).await?;
    info!(event_id = %event.id, ticket_id, %event_type, ?outcome, "event injected");
    Ok(outcome)
}

pub async fn run_enqueue(
    store: &dyn EventStore,
    event_type: EventType,
    ticket_id: &str,
    payload: &str,
) -> Result<(), CourierError> {
    match enqueue(store, event_type, ticket_id, payload).await? {
        EnqueueOutcome::Enqueued { id } => println!("enqueued as entry {id}"),
        EnqueueOutcome::Duplicate { fingerprint } => {
            println!("duplicate of a recent event ({fingerprint}), dropped")
        }
    }
    Ok(())
}
