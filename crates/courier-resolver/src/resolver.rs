// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mapping lookup, thread fetch and the retry loop around them.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use courier_config::model::ResolverConfig;
use courier_core::types::{ThreadHandle, TicketThreadMapping};
use courier_core::{ChatPlatform, CourierError, MappingStore, ResolveFailure, Scheduler};
use courier_prometheus::recording;

const NOT_FOUND: &str = "no thread mapping exists for this ticket yet";

/// Result of a single mapping lookup.
///
/// Absence is expected while the ticket's thread is still being created, so
/// it is a value here and not an error.
#[derive(Debug)]
pub enum MappingLookup {
    Found(TicketThreadMapping),
    NotYetAvailable,
    /// The canonical store failed; retrying will not help.
    Fatal(CourierError),
}

/// A mapping together with the live thread it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedThread {
    pub mapping: TicketThreadMapping,
    pub thread: ThreadHandle,
}

/// Retry budget for [`MappingResolver::resolve_with_retry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryOptions {
    /// Lookups to make before giving up, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Total time budget. No delay is started that would overrun it.
    pub max_retry_window: Duration,
}

impl RetryOptions {
    pub fn from_config(config: &ResolverConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: config.base_delay(),
            max_retry_window: config.max_retry_window(),
        }
    }

    /// Delay after the `attempt`-th failed lookup (1-based), with a jitter
    /// fraction in `[0, 1)` of the base delay added.
    pub fn delay_with_jitter(&self, attempt: u32, jitter: f64) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let ceiling = 2u32
            .checked_pow(exponent)
            .and_then(|m| self.base_delay.checked_mul(m))
            .unwrap_or(Duration::MAX);
        ceiling.saturating_add(self.base_delay.mul_f64(jitter.clamp(0.0, 1.0)))
    }

    fn delay(&self, attempt: u32) -> Duration {
        let jitter: f64 = rand::thread_rng().r#gen();
        self.delay_with_jitter(attempt, jitter)
    }
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self::from_config(&ResolverConfig::default())
    }
}

/// Resolves tickets to threads through a [`MappingStore`] and a [`ChatPlatform`].
pub struct MappingResolver {
    mappings: Arc<dyn MappingStore>,
    chat: Arc<dyn ChatPlatform>,
    scheduler: Arc<dyn Scheduler>,
}

impl MappingResolver {
    pub fn new(
        mappings: Arc<dyn MappingStore>,
        chat: Arc<dyn ChatPlatform>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        Self {
            mappings,
            chat,
            scheduler,
        }
    }

    /// One lookup: the fast path first when supplied, then the canonical store.
    ///
    /// Fast-path errors fall through to the canonical store. Canonical
    /// errors are fatal.
    pub async fn lookup(
        &self,
        ticket_id: &str,
        fast: Option<&dyn MappingStore>,
    ) -> MappingLookup {
        if let Some(fast) = fast {
            match fast.get_by_ticket_id(ticket_id).await {
                Ok(Some(mapping)) => {
                    recording::record_resolver_lookup("fast_hit");
                    return MappingLookup::Found(mapping);
                }
                Ok(None) => {}
                Err(e) => debug!(ticket_id, error = %e, "fast mapping lookup failed, using canonical store"),
            }
        }

        match self.mappings.get_by_ticket_id(ticket_id).await {
            Ok(Some(mapping)) => {
                recording::record_resolver_lookup("found");
                MappingLookup::Found(mapping)
            }
            Ok(None) => {
                recording::record_resolver_lookup("not_yet_available");
                MappingLookup::NotYetAvailable
            }
            Err(e) => {
                recording::record_resolver_lookup("fatal");
                MappingLookup::Fatal(e)
            }
        }
    }

    /// Single attempt. A missing mapping is reported as
    /// [`CourierError::MappingUnavailable`] after one attempt.
    pub async fn resolve(&self, ticket_id: &str) -> Result<ResolvedThread, CourierError> {
        match self.lookup(ticket_id, None).await {
            MappingLookup::Found(mapping) => self.fetch_thread(mapping).await,
            MappingLookup::Fatal(e) => Err(e),
            MappingLookup::NotYetAvailable => Err(CourierError::MappingUnavailable(Box::new(
                ResolveFailure {
                    ticket_id: ticket_id.to_string(),
                    attempts_made: 1,
                    total_retry_time: Duration::ZERO,
                    likely_race_condition: true,
                    original_error: NOT_FOUND.to_string(),
                },
            ))),
        }
    }

    /// Look the mapping up until it appears, the attempts run out, or the
    /// next delay would overrun the retry window.
    ///
    /// Running out of attempts inside the window is reported as a likely
    /// creation race. Running out of window is reported as an outage.
    pub async fn resolve_with_retry(
        &self,
        ticket_id: &str,
        options: RetryOptions,
        fast: Option<&dyn MappingStore>,
    ) -> Result<ResolvedThread, CourierError> {
        let started = self.scheduler.now();
        let max_attempts = options.max_attempts.max(1);
        let mut attempts = 0;

        // `true` when the retry window, not the attempt budget, ended the loop.
        let (elapsed, window_spent) = loop {
            attempts += 1;
            match self.lookup(ticket_id, fast).await {
                MappingLookup::Found(mapping) => {
                    if attempts > 1 {
                        debug!(ticket_id, attempts, "mapping appeared after retry");
                    }
                    let resolved = self.fetch_thread(mapping).await;
                    recording::record_resolver_outcome(if resolved.is_ok() {
                        "resolved"
                    } else {
                        "thread_error"
                    });
                    return resolved;
                }
                MappingLookup::Fatal(e) => {
                    recording::record_resolver_outcome("fatal");
                    return Err(e);
                }
                MappingLookup::NotYetAvailable => {}
            }

            let elapsed = (self.scheduler.now() - started).to_std().unwrap_or_default();
            if elapsed >= options.max_retry_window {
                break (elapsed, true);
            }
            if attempts >= max_attempts {
                break (elapsed, false);
            }
            let delay = options.delay(attempts);
            if elapsed.saturating_add(delay) > options.max_retry_window {
                debug!(ticket_id, attempts, "retry window would be exceeded, giving up");
                break (elapsed, true);
            }
            debug!(
                ticket_id,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                "mapping not yet available, retrying"
            );
            self.scheduler.after(delay).await;
        };

        let failure = ResolveFailure {
            ticket_id: ticket_id.to_string(),
            attempts_made: attempts,
            total_retry_time: elapsed,
            likely_race_condition: !window_spent && elapsed < options.max_retry_window,
            original_error: NOT_FOUND.to_string(),
        };
        if failure.likely_race_condition {
            warn!(
                ticket_id,
                attempts,
                elapsed_ms = elapsed.as_millis() as u64,
                "mapping still missing; probably a creation race, a manual retry will likely succeed"
            );
        } else {
            warn!(
                ticket_id,
                attempts,
                elapsed_ms = elapsed.as_millis() as u64,
                "mapping still missing after the full retry window; looks like a real outage"
            );
        }
        recording::record_resolver_outcome("exhausted");
        Err(CourierError::MappingUnavailable(Box::new(failure)))
    }

    async fn fetch_thread(&self, mapping: TicketThreadMapping) -> Result<ResolvedThread, CourierError> {
        let Some(thread) = self.chat.fetch_thread(&mapping.thread_id).await? else {
            return Err(CourierError::ThreadNotFound {
                ticket_id: mapping.ticket_id,
                thread_id: mapping.thread_id,
            });
        };
        if !thread.is_thread() {
            return Err(CourierError::NotAThread {
                ticket_id: mapping.ticket_id,
                thread_id: mapping.thread_id,
            });
        }
        Ok(ResolvedThread { mapping, thread })
    }
}
