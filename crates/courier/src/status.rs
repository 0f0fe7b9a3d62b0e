// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `courier status` command implementation.

use chrono::Utc;
use serde::Serialize;

use courier_core::types::{QueueName, QueueStats};
use courier_core::{CourierError, EventStore};
use courier_prometheus::PrometheusAdapter;
use courier_prometheus::recording;

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct QueueDepth {
    pub queue: &'static str,
    pub depth: u64,
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub queues: Vec<QueueDepth>,
    pub oldest_queued_secs: u64,
    pub dedup_hits: u64,
}

impl StatusReport {
    pub fn from_stats(stats: &QueueStats, now: chrono::DateTime<Utc>) -> Self {
        Self {
            queues: QueueName::ALL
                .into_iter()
                .map(|queue| QueueDepth {
                    queue: queue.as_str(),
                    depth: stats.depth(queue),
                })
                .collect(),
            oldest_queued_secs: stats.oldest_age(now).as_secs(),
            dedup_hits: stats.dedup_hits,
        }
    }
}

/// Format seconds into a human-readable duration string.
pub fn format_age(secs: u64) -> String {
    let days = secs / 86400;
    let hours = (secs % 86400) / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

pub async fn run_status(store: &dyn EventStore, prometheus: bool) -> Result<(), CourierError> {
    let stats = store.stats().await?;
    let now = Utc::now();
    let report = StatusReport::from_stats(&stats, now);

    println!();
    println!("  courier status");
    println!("  {}", "-".repeat(35));
    for q in &report.queues {
        println!("    {:<22} {}", q.queue, q.depth);
    }
    if stats.oldest_queued_at.is_some() {
        println!("    {:<22} {}", "oldest queued", format_age(report.oldest_queued_secs));
    }
    println!("    {:<22} {}", "dedup hits", report.dedup_hits);
    println!();

    if prometheus {
        let adapter = PrometheusAdapter::new()?;
        recording::publish_queue_stats(&stats, now);
        print!("{}", adapter.render());
    }
    Ok(())
}
