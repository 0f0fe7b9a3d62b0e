// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any installed recorder can collect these.
//! With no recorder installed every call is a no-op.

use chrono::{DateTime, Utc};
use metrics::{describe_counter, describe_gauge, describe_histogram};

use courier_core::types::{QueueName, QueueStats};

/// Register all Courier metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!("courier_events_enqueued_total", "Events accepted into the queue");
    describe_counter!(
        "courier_dedup_hits_total",
        "Events dropped because a live dedup record matched"
    );
    describe_counter!("courier_events_processed_total", "Handler outcomes by event type");
    describe_counter!("courier_requeues_total", "Entries returned to the queue with backoff");
    describe_counter!("courier_dead_letters_total", "Entries moved to the dead-letter table");
    describe_counter!("courier_lease_recoveries_total", "Expired processing leases recovered");
    describe_counter!("courier_resolver_lookups_total", "Mapping lookups by result");
    describe_counter!("courier_resolver_outcomes_total", "Resolver calls by final outcome");
    describe_counter!("courier_attachments_total", "Attachment verdicts by reason");
    describe_gauge!("courier_queue_depth", "Entries per logical queue");
    describe_gauge!(
        "courier_oldest_queued_age_seconds",
        "Age of the oldest queued entry in seconds"
    );
    describe_histogram!(
        "courier_event_processing_seconds",
        "Handler latency per event in seconds"
    );
}

/// Record an accepted enqueue.
pub fn record_enqueued(event_type: &str) {
    metrics::counter!("courier_events_enqueued_total", "event_type" => event_type.to_string())
        .increment(1);
}

/// Record a duplicate dropped at enqueue time.
pub fn record_dedup_hit(event_type: &str) {
    metrics::counter!("courier_dedup_hits_total", "event_type" => event_type.to_string())
        .increment(1);
}

/// Record one handler run and its latency.
pub fn record_processed(event_type: &str, outcome: &'static str, seconds: f64) {
    metrics::counter!(
        "courier_events_processed_total",
        "event_type" => event_type.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    metrics::histogram!(
        "courier_event_processing_seconds",
        "event_type" => event_type.to_string()
    )
    .record(seconds);
}

pub fn record_requeue(event_type: &str) {
    metrics::counter!("courier_requeues_total", "event_type" => event_type.to_string())
        .increment(1);
}

pub fn record_dead_letter(reason: &str) {
    metrics::counter!("courier_dead_letters_total", "reason" => reason.to_string()).increment(1);
}

pub fn record_lease_recoveries(count: usize) {
    metrics::counter!("courier_lease_recoveries_total").increment(count as u64);
}

/// Record a single mapping lookup (`found`, `not_yet_available`, `fatal`).
pub fn record_resolver_lookup(result: &'static str) {
    metrics::counter!("courier_resolver_lookups_total", "result" => result).increment(1);
}

/// Record how a resolver call ended (`resolved`, `exhausted`, `failed`).
pub fn record_resolver_outcome(outcome: &'static str) {
    metrics::counter!("courier_resolver_outcomes_total", "outcome" => outcome).increment(1);
}

/// Record an attachment verdict; `reason` is `accepted` or a rejection reason.
pub fn record_attachment(reason: &str) {
    metrics::counter!("courier_attachments_total", "reason" => reason.to_string()).increment(1);
}

/// Publish queue gauges from a stats snapshot.
pub fn publish_queue_stats(stats: &QueueStats, now: DateTime<Utc>) {
    for queue in QueueName::ALL {
        metrics::gauge!("courier_queue_depth", "queue" => queue.as_str())
            .set(stats.depth(queue) as f64);
    }
    metrics::gauge!("courier_oldest_queued_age_seconds").set(stats.oldest_age(now).as_secs_f64());
}
