// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the event store and mapping store traits.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use courier_config::model::{QueueConfig, StorageConfig};
use courier_core::types::{
    DeadLetter, DeadLetterReason, EnqueueOutcome, InboundEvent, NewMapping, QueueEntry,
    QueueStats, TicketThreadMapping,
};
use courier_core::{
    AdapterType, Clock, CourierError, EventStore, HealthStatus, MappingStore, PluginAdapter,
    TokioScheduler,
};
use courier_prometheus::recording;

use crate::database::Database;
use crate::queries;
use crate::queries::mappings::InsertResult;

/// SQLite-backed event store and mapping store.
///
/// The database is opened by [`SqliteStorage::initialize`]; every trait
/// method fails with a storage error until then.
pub struct SqliteStorage {
    config: StorageConfig,
    queue: QueueConfig,
    clock: Arc<dyn Clock>,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// Create a new SqliteStorage. The connection is not opened yet.
    pub fn new(config: StorageConfig, queue: QueueConfig) -> Self {
        Self {
            config,
            queue,
            clock: Arc::new(TokioScheduler),
            db: OnceCell::new(),
        }
    }

    /// Replace the wall clock, e.g. with a test clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Create and initialize in one step.
    pub async fn open(config: StorageConfig, queue: QueueConfig) -> Result<Self, CourierError> {
        let storage = Self::new(config, queue);
        storage.initialize().await?;
        Ok(storage)
    }

    /// Open the database, apply PRAGMAs and run migrations.
    pub async fn initialize(&self) -> Result<(), CourierError> {
        let db = Database::open_with(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| CourierError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    /// Returns the underlying Database, or an error if not initialized.
    pub fn database(&self) -> Result<&Database, CourierError> {
        self.db.get().ok_or_else(|| CourierError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }

    fn lease(&self) -> Duration {
        self.queue.processing_lease()
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, CourierError> {
        let Ok(db) = self.database() else {
            return Ok(HealthStatus::Unhealthy("database not opened".into()));
        };
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), CourierError> {
        if let Some(db) = self.db.get() {
            db.connection()
                .call(|conn| -> Result<(), rusqlite::Error> {
                    conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                    Ok(())
                })
                .await
                .map_err(crate::database::map_tr_err)?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl EventStore for SqliteStorage {
    async fn enqueue(&self, event: &InboundEvent) -> Result<EnqueueOutcome, CourierError> {
        let outcome =
            queries::queue::enqueue(self.database()?, event, self.clock.now(), self.queue.dedup_ttl())
                .await?;
        let event_type = event.event_type.to_string();
        match &outcome {
            EnqueueOutcome::Enqueued { id } => {
                recording::record_enqueued(&event_type);
                debug!(id, event_id = %event.id, ticket_id = %event.ticket_id, %event_type, "event enqueued");
            }
            EnqueueOutcome::Duplicate { fingerprint } => {
                recording::record_dedup_hit(&event_type);
                debug!(event_id = %event.id, ticket_id = %event.ticket_id, %fingerprint, "duplicate event dropped");
            }
        }
        Ok(outcome)
    }

    async fn dequeue(&self, consumer: &str) -> Result<Option<QueueEntry>, CourierError> {
        queries::queue::dequeue(self.database()?, consumer, self.clock.now(), self.lease()).await
    }

    async fn move_to_processing(
        &self,
        id: i64,
        consumer: &str,
    ) -> Result<Option<QueueEntry>, CourierError> {
        queries::queue::move_to_processing(
            self.database()?,
            id,
            consumer,
            self.clock.now(),
            self.lease(),
        )
        .await
    }

    async fn ack(&self, entry: &QueueEntry) -> Result<(), CourierError> {
        if !queries::queue::ack(self.database()?, entry).await? {
            return Err(lease_lost(entry));
        }
        Ok(())
    }

    async fn requeue_with_delay(
        &self,
        entry: &QueueEntry,
        delay: Duration,
    ) -> Result<(), CourierError> {
        if entry.attempt_count > self.queue.max_retries {
            return Err(CourierError::Internal(format!(
                "refusing to requeue entry {} with {} attempts (max_retries = {})",
                entry.id, entry.attempt_count, self.queue.max_retries
            )));
        }
        let held =
            queries::queue::requeue(self.database()?, entry, self.clock.now(), delay).await?;
        if !held {
            return Err(lease_lost(entry));
        }
        Ok(())
    }

    async fn dead_letter(
        &self,
        entry: &QueueEntry,
        reason: DeadLetterReason,
        context: serde_json::Value,
    ) -> Result<(), CourierError> {
        let id = queries::dead_letters::insert(
            self.database()?,
            entry,
            reason,
            context,
            self.clock.now(),
        )
        .await?
        .ok_or_else(|| lease_lost(entry))?;
        debug!(dead_letter_id = id, entry_id = entry.id, %reason, "entry dead-lettered");
        Ok(())
    }

    async fn recover_expired(&self) -> Result<usize, CourierError> {
        let report = queries::queue::recover_expired(
            self.database()?,
            self.clock.now(),
            self.queue.max_retries,
        )
        .await?;
        if report.total() > 0 {
            recording::record_lease_recoveries(report.total());
            for _ in 0..report.dead_lettered {
                recording::record_dead_letter(&DeadLetterReason::LeaseExpired.to_string());
            }
            warn!(
                requeued = report.requeued,
                dead_lettered = report.dead_lettered,
                "recovered entries with expired processing leases"
            );
        }
        Ok(report.total())
    }

    async fn stats(&self) -> Result<QueueStats, CourierError> {
        queries::queue::stats(self.database()?).await
    }

    async fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetter>, CourierError> {
        queries::dead_letters::list(self.database()?, limit).await
    }

    async fn replay_dead_letter(&self, id: i64) -> Result<Option<i64>, CourierError> {
        let queued = queries::dead_letters::replay(self.database()?, id, self.clock.now()).await?;
        if let Some(queue_id) = queued {
            info!(dead_letter_id = id, queue_id, "dead letter replayed");
        }
        Ok(queued)
    }

    async fn purge_expired_dedup(&self) -> Result<usize, CourierError> {
        queries::queue::purge_expired_dedup(self.database()?, self.clock.now()).await
    }
}

fn lease_lost(entry: &QueueEntry) -> CourierError {
    CourierError::LeaseLost {
        entry_id: entry.id,
        consumer: entry.locked_by.clone().unwrap_or_default(),
    }
}

#[async_trait]
impl MappingStore for SqliteStorage {
    async fn get_by_ticket_id(
        &self,
        ticket_id: &str,
    ) -> Result<Option<TicketThreadMapping>, CourierError> {
        queries::mappings::get_by_ticket_id(self.database()?, ticket_id).await
    }

    async fn create(&self, mapping: &NewMapping) -> Result<TicketThreadMapping, CourierError> {
        match queries::mappings::insert(self.database()?, mapping, self.clock.now()).await? {
            InsertResult::Created(created) => {
                info!(ticket_id = %created.ticket_id, thread_id = %created.thread_id, "ticket mapping created");
                Ok(created)
            }
            InsertResult::Existing(existing) if existing.thread_id == mapping.thread_id => {
                Ok(existing)
            }
            InsertResult::Existing(existing) => Err(CourierError::MappingConflict {
                ticket_id: existing.ticket_id,
                existing: existing.thread_id,
                requested: mapping.thread_id.clone(),
            }),
        }
    }
}
