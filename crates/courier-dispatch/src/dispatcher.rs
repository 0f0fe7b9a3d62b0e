// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The queue consumer loop.
//!
//! A [`Dispatcher`] claims entries from an [`EventStore`], routes each one to
//! the [`EventHandler`] registered for its event type and applies the
//! handler's [`HandlerOutcome`]:
//!
//! - `Done` acknowledges the entry.
//! - `Retry` requeues it with jittered exponential backoff until the retry
//!   bound, after which it is dead-lettered as exhausted.
//! - `Reject` dead-letters it immediately.
//!
//! If the entry's lease expired and another consumer reclaimed it while the
//! handler ran, the outcome is dropped and the entry is left to its new
//! holder.
//!
//! The dispatcher is the only component that decides between those paths.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use courier_config::model::CourierConfig;
use courier_core::types::{DeadLetterReason, EventType, QueueEntry};
use courier_core::{Backoff, CourierError, ErrorClass, EventStore, Scheduler};
use courier_prometheus::recording;

use crate::handler::{EventHandler, HandlerOutcome};

/// Tunables for a [`Dispatcher`].
#[derive(Debug, Clone)]
pub struct DispatcherOptions {
    /// Identifies this consumer in `locked_by`.
    pub consumer_id: String,
    /// Failed attempts after which an entry is dead-lettered.
    pub max_retries: u32,
    pub backoff: Backoff,
    /// Entries claimed per batch.
    pub concurrency: usize,
    /// Sleep between polls when the queue is empty.
    pub idle_poll: Duration,
    /// How often `run` sweeps expired leases and dedup records.
    pub recovery_interval: Duration,
}

impl DispatcherOptions {
    pub fn from_config(config: &CourierConfig) -> Self {
        Self {
            consumer_id: config.service.consumer_id.clone(),
            max_retries: config.queue.max_retries,
            backoff: config.dispatch.backoff(),
            concurrency: config.dispatch.concurrency.max(1),
            idle_poll: config.dispatch.idle_poll(),
            recovery_interval: config.dispatch.recovery_interval(),
        }
    }
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self::from_config(&CourierConfig::default())
    }
}

/// Where an entry ended up after one processing attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Acked,
    Requeued { delay: Duration },
    DeadLettered { reason: DeadLetterReason },
    /// The lease was lost mid-flight; nothing was recorded.
    LeaseLost,
}

/// Outcome of one recovery sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub recovered: usize,
    pub dedup_purged: usize,
}

/// Consumes the event queue and dispatches entries to handlers.
pub struct Dispatcher {
    store: Arc<dyn EventStore>,
    scheduler: Arc<dyn Scheduler>,
    handlers: HashMap<EventType, Arc<dyn EventHandler>>,
    options: DispatcherOptions,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn EventStore>,
        scheduler: Arc<dyn Scheduler>,
        options: DispatcherOptions,
    ) -> Self {
        Self {
            store,
            scheduler,
            handlers: HashMap::new(),
            options,
        }
    }

    /// Route events of `event_type` to `handler`, replacing any previous one.
    pub fn register(&mut self, event_type: EventType, handler: Arc<dyn EventHandler>) {
        if self.handlers.insert(event_type, handler).is_some() {
            warn!(%event_type, "replacing previously registered handler");
        }
    }

    /// Builder form of [`Dispatcher::register`].
    pub fn with_handler(mut self, event_type: EventType, handler: Arc<dyn EventHandler>) -> Self {
        self.register(event_type, handler);
        self
    }

    pub fn handles(&self, event_type: EventType) -> bool {
        self.handlers.contains_key(&event_type)
    }

    pub fn options(&self) -> &DispatcherOptions {
        &self.options
    }

    /// Claim and process a single entry. `Ok(None)` when nothing is ready.
    pub async fn run_once(&self) -> Result<Option<Transition>, CourierError> {
        let Some(entry) = self.store.dequeue(&self.options.consumer_id).await? else {
            return Ok(None);
        };
        self.process(entry).await.map(Some)
    }

    /// Claim up to `concurrency` entries and process them.
    ///
    /// Entries of the same ticket run one after another in claim order;
    /// different tickets run concurrently. Returns the number of entries
    /// processed.
    pub async fn run_batch(&self) -> Result<usize, CourierError> {
        let mut groups: Vec<(String, Vec<QueueEntry>)> = Vec::new();
        let mut claimed = 0;
        let mut claim_error = None;
        while claimed < self.options.concurrency {
            let entry = match self.store.dequeue(&self.options.consumer_id).await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                // Entries already claimed still get dispatched below.
                Err(e) => {
                    claim_error = Some(e);
                    break;
                }
            };
            claimed += 1;
            match groups
                .iter_mut()
                .find(|(ticket, _)| *ticket == entry.event.ticket_id)
            {
                Some((_, entries)) => entries.push(entry),
                None => groups.push((entry.event.ticket_id.clone(), vec![entry])),
            }
        }

        let results = join_all(groups.into_iter().map(|(_, entries)| async move {
            for entry in entries {
                self.process(entry).await?;
            }
            Ok::<(), CourierError>(())
        }))
        .await;

        if let Some(e) = claim_error {
            return Err(e);
        }
        // A store failure leaves the entry in processing; the lease sweep
        // brings it back.
        for result in results {
            result?;
        }
        Ok(claimed)
    }

    /// Run one entry through its handler and apply the outcome.
    pub async fn process(&self, entry: QueueEntry) -> Result<Transition, CourierError> {
        let event_type = entry.event.event_type;
        let label = event_type.to_string();
        let started = Instant::now();

        let Some(handler) = self.handlers.get(&event_type).cloned() else {
            let err = format!("no handler registered for event type {event_type}");
            warn!(entry_id = entry.id, event_id = %entry.event.id, %event_type, "{err}");
            let failed = entry.with_failure(err, self.scheduler.now());
            let reason = DeadLetterReason::NoHandler;
            let context = json!({
                "attempts_made": failed.attempt_count,
                "total_elapsed_ms": 0,
                "likely_cause": "no handler registered for this event type",
                "error_class": ErrorClass::Terminal,
            });
            let settled = self
                .store
                .dead_letter(&failed, reason, context)
                .await
                .map(|()| {
                    recording::record_dead_letter(&reason.to_string());
                    Transition::DeadLettered { reason }
                });
            recording::record_processed(&label, "no_handler", started.elapsed().as_secs_f64());
            return unless_lease_lost(settled);
        };

        debug!(
            entry_id = entry.id,
            event_id = %entry.event.id,
            ticket_id = %entry.event.ticket_id,
            %event_type,
            attempt = entry.attempt_count + 1,
            "dispatching entry"
        );

        let outcome = handler.handle(&entry.event).await;
        let outcome_label = outcome.label();
        let settled = match outcome {
            HandlerOutcome::Done => self.store.ack(&entry).await.map(|()| Transition::Acked),
            HandlerOutcome::Retry(err) => self.retry(entry, err).await,
            HandlerOutcome::Reject(err) => self.reject(entry, err).await,
        };
        let transition = unless_lease_lost(settled)?;

        recording::record_processed(&label, outcome_label, started.elapsed().as_secs_f64());
        Ok(transition)
    }

    async fn retry(&self, entry: QueueEntry, err: CourierError) -> Result<Transition, CourierError> {
        let now = self.scheduler.now();
        let previous_attempts = entry.attempt_count;
        let failed = entry.with_failure(err.to_string(), now);

        if failed.attempt_count >= self.options.max_retries {
            let reason = DeadLetterReason::RetriesExhausted;
            let context = diagnostics(&failed, &err, ErrorClass::Exhausted, now);
            warn!(
                entry_id = failed.id,
                ticket_id = %failed.event.ticket_id,
                attempts = failed.attempt_count,
                error = %err,
                "retry budget exhausted, dead-lettering"
            );
            self.store.dead_letter(&failed, reason, context).await?;
            recording::record_dead_letter(&reason.to_string());
            return Ok(Transition::DeadLettered { reason });
        }

        let delay = self.options.backoff.delay(previous_attempts);
        warn!(
            entry_id = failed.id,
            ticket_id = %failed.event.ticket_id,
            attempt = failed.attempt_count,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "transient failure, requeueing"
        );
        self.store.requeue_with_delay(&failed, delay).await?;
        recording::record_requeue(&failed.event.event_type.to_string());
        Ok(Transition::Requeued { delay })
    }

    async fn reject(&self, entry: QueueEntry, err: CourierError) -> Result<Transition, CourierError> {
        let now = self.scheduler.now();
        let failed = entry.with_failure(err.to_string(), now);
        let reason = DeadLetterReason::PermanentFailure;
        let context = diagnostics(&failed, &err, err.class(), now);
        error!(
            entry_id = failed.id,
            ticket_id = %failed.event.ticket_id,
            error_class = %err.class(),
            error = %err,
            "permanent failure, dead-lettering"
        );
        self.store.dead_letter(&failed, reason, context).await?;
        recording::record_dead_letter(&reason.to_string());
        Ok(Transition::DeadLettered { reason })
    }

    /// Recover expired leases, purge stale dedup records and publish queue gauges.
    pub async fn sweep(&self) -> Result<SweepReport, CourierError> {
        let recovered = self.store.recover_expired().await?;
        let dedup_purged = self.store.purge_expired_dedup().await?;
        let stats = self.store.stats().await?;
        recording::publish_queue_stats(&stats, self.scheduler.now());
        if recovered > 0 || dedup_purged > 0 {
            info!(recovered, dedup_purged, "recovery sweep finished");
        }
        Ok(SweepReport {
            recovered,
            dedup_purged,
        })
    }

    /// Consume the queue until `cancel` fires.
    ///
    /// Store errors are logged and followed by an idle poll rather than
    /// ending the loop.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), CourierError> {
        info!(
            consumer_id = %self.options.consumer_id,
            concurrency = self.options.concurrency,
            "dispatcher running"
        );
        let mut last_sweep: Option<DateTime<Utc>> = None;

        while !cancel.is_cancelled() {
            let now = self.scheduler.now();
            let sweep_due = last_sweep.is_none_or(|at| {
                (now - at).to_std().unwrap_or_default() >= self.options.recovery_interval
            });
            if sweep_due {
                if let Err(e) = self.sweep().await {
                    error!(error = %e, "recovery sweep failed");
                }
                last_sweep = Some(now);
            }

            let idle = match self.run_batch().await {
                Ok(processed) => processed == 0,
                Err(e) => {
                    error!(error = %e, "dispatch batch failed");
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = self.scheduler.after(self.options.idle_poll) => {}
                }
            }
        }

        info!("dispatcher stopped");
        Ok(())
    }
}

/// Turn a lost lease into [`Transition::LeaseLost`]; other errors pass through.
fn unless_lease_lost(
    settled: Result<Transition, CourierError>,
) -> Result<Transition, CourierError> {
    match settled {
        Err(CourierError::LeaseLost { entry_id, consumer }) => {
            warn!(
                entry_id,
                %consumer,
                "processing lease lost before the outcome was recorded, leaving entry to its new holder"
            );
            Ok(Transition::LeaseLost)
        }
        other => other,
    }
}

fn diagnostics(
    failed: &QueueEntry,
    err: &CourierError,
    class: ErrorClass,
    now: DateTime<Utc>,
) -> serde_json::Value {
    let elapsed_ms = failed
        .first_attempt_at
        .map(|first| (now - first).num_milliseconds().max(0))
        .unwrap_or(0);
    json!({
        "attempts_made": failed.attempt_count,
        "total_elapsed_ms": elapsed_ms,
        "likely_cause": likely_cause(err),
        "error_class": class,
    })
}

/// A human-readable guess at what went wrong, for dead-letter triage.
pub fn likely_cause(err: &CourierError) -> &'static str {
    match err {
        CourierError::MappingUnavailable(failure) if failure.likely_race_condition => {
            "ticket/thread mapping race; replay once the mapping exists"
        }
        CourierError::MappingUnavailable(_) => "mapping store unavailable or thread never created",
        CourierError::Download { .. } => "attachment host unreachable or slow",
        CourierError::Upload { .. } => "chat platform rejected or timed out the upload",
        CourierError::Timeout { .. } => "upstream timeout",
        CourierError::Storage { .. } => "storage busy or unavailable",
        CourierError::Chat { retryable: true, .. } => "chat platform rate limit or outage",
        CourierError::Chat { .. } => "chat platform refused the request (permissions?)",
        CourierError::InvalidPayload { .. } => "malformed event payload",
        CourierError::ThreadNotFound { .. } | CourierError::NotAThread { .. } => {
            "mapped thread missing or not a thread"
        }
        CourierError::MappingConflict { .. } => "ticket already mapped to another thread",
        CourierError::LeaseLost { .. } => "consumer outlived its processing lease",
        CourierError::Config(_) | CourierError::Internal(_) => "internal or configuration error",
    }
}
