// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exponential backoff with multiplicative jitter.
//!
//! `delay = min(max, base * 2^attempt) * factor`, with `factor` drawn from
//! `[0.5, 1.5)`. Shared by the dispatcher's requeue path and the attachment
//! upload retries.

use std::time::Duration;

use rand::Rng;

/// Lower bound of the jitter factor.
pub const JITTER_MIN: f64 = 0.5;
/// Upper bound (exclusive) of the jitter factor.
pub const JITTER_MAX: f64 = 1.5;

/// Backoff policy parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Un-jittered delay for a 0-indexed attempt, capped at `max`.
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let multiplier = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base
            .checked_mul(multiplier)
            .map_or(self.max, |d| d.min(self.max))
    }

    /// Delay with an explicit jitter factor, clamped to the jitter range.
    pub fn delay_with_factor(&self, attempt: u32, factor: f64) -> Duration {
        let factor = factor.clamp(JITTER_MIN, JITTER_MAX);
        self.ceiling(attempt).mul_f64(factor)
    }

    /// Delay with a random jitter factor.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = rand::thread_rng().gen_range(JITTER_MIN..JITTER_MAX);
        self.delay_with_factor(attempt, factor)
    }
}
