// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Time source and delay scheduling.
//!
//! Backoff waits go through [`Scheduler::after`] so tests can substitute a
//! virtual clock instead of sleeping.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Wall-clock time source.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Suspends the current task for a duration.
#[async_trait]
pub trait Scheduler: Clock {
    async fn after(&self, delay: Duration);
}

/// Production scheduler backed by `tokio::time`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl Clock for TokioScheduler {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[async_trait]
impl Scheduler for TokioScheduler {
    async fn after(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}
