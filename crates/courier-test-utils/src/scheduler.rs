// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Virtual clock. `after` returns immediately and advances time.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use courier_core::{Clock, Scheduler};

#[derive(Debug)]
struct State {
    now: DateTime<Utc>,
    delays: Vec<Duration>,
}

/// A [`Scheduler`] whose clock only moves when told to.
///
/// Every `after(d)` call is recorded and advances the clock by `d` without
/// sleeping. Clones share the same clock.
#[derive(Debug, Clone)]
pub struct ManualScheduler {
    state: Arc<Mutex<State>>,
}

impl ManualScheduler {
    /// Starts at 2026-01-01T00:00:00Z.
    pub fn new() -> Self {
        Self::starting_at(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap())
    }

    pub fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                now,
                delays: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panicking test thread must not hide the clock from the others.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Move the clock forward without recording a delay.
    pub fn advance(&self, by: Duration) {
        let mut state = self.lock();
        state.now += chrono::Duration::from_std(by).unwrap_or(chrono::Duration::MAX);
    }

    /// Every delay requested through `after`, in order.
    pub fn delays(&self) -> Vec<Duration> {
        self.lock().delays.clone()
    }

    /// Sum of all requested delays.
    pub fn total_slept(&self) -> Duration {
        self.lock().delays.iter().sum()
    }

    pub fn clear_delays(&self) {
        self.lock().delays.clear();
    }
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualScheduler {
    fn now(&self) -> DateTime<Utc> {
        self.lock().now
    }
}

#[async_trait]
impl Scheduler for ManualScheduler {
    async fn after(&self, delay: Duration) {
        let mut state = self.lock();
        state.delays.push(delay);
        state.now += chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::MAX);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn after_records_and_advances_instantly() {
        let sched = ManualScheduler::new();
        let start = sched.now();

        sched.after(Duration::from_millis(500)).await;
        sched.after(Duration::from_secs(2)).await;
        sched.advance(Duration::from_secs(10));

        assert_eq!(
            sched.delays(),
            vec![Duration::from_millis(500), Duration::from_secs(2)]
        );
        assert_eq!(sched.total_slept(), Duration::from_millis(2_500));
        assert_eq!(sched.now() - start, chrono::Duration::milliseconds(12_500));
    }

    #[tokio::test]
    async fn clones_share_the_clock() {
        let a = ManualScheduler::new();
        let b = a.clone();
        a.after(Duration::from_secs(1)).await;
        assert_eq!(a.now(), b.now());
        assert_eq!(b.delays().len(), 1);
    }
}
