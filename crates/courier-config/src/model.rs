// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Courier event pipeline.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use courier_core::Backoff;
use serde::{Deserialize, Serialize};

/// Top-level Courier configuration.
///
/// Loaded from TOML files following the XDG hierarchy, with environment
/// variable overrides. Every section is optional and has working defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CourierConfig {
    /// Process identity and logging.
    #[serde(default)]
    pub service: ServiceConfig,

    /// SQLite database settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Event store retry, dedup and lease settings.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Consumer loop settings.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Ticket-to-thread resolver retry policy.
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Attachment download/upload limits.
    #[serde(default)]
    pub attachments: AttachmentConfig,
}

/// Process identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Display name used in logs.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Identifier recorded on claimed queue entries.
    #[serde(default = "default_consumer_id")]
    pub consumer_id: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            consumer_id: default_consumer_id(),
        }
    }
}

fn default_service_name() -> String {
    "courier".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_consumer_id() -> String {
    format!("courier-{}", uuid::Uuid::new_v4().simple())
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("courier").join("courier.db"))
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "courier.db".to_string())
}

fn default_wal_mode() -> bool {
    true
}

/// Event store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// Failed attempts after which an entry is dead-lettered.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Lifetime of a dedup record in seconds.
    #[serde(default = "default_dedup_ttl_secs")]
    pub dedup_ttl_secs: u64,

    /// How long a claimed entry stays invisible before recovery returns it.
    #[serde(default = "default_processing_lease_secs")]
    pub processing_lease_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            dedup_ttl_secs: default_dedup_ttl_secs(),
            processing_lease_secs: default_processing_lease_secs(),
        }
    }
}

impl QueueConfig {
    pub fn dedup_ttl(&self) -> Duration {
        Duration::from_secs(self.dedup_ttl_secs)
    }

    pub fn processing_lease(&self) -> Duration {
        Duration::from_secs(self.processing_lease_secs)
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_dedup_ttl_secs() -> u64 {
    300
}

fn default_processing_lease_secs() -> u64 {
    300
}

/// Consumer loop configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    /// Entries processed concurrently per batch.
    #[serde(default = "default_dispatch_concurrency")]
    pub concurrency: usize,

    /// Backoff base delay in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Backoff ceiling in milliseconds (before jitter).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Sleep between polls of an empty queue.
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,

    /// Interval between lease-recovery sweeps.
    #[serde(default = "default_recovery_interval_secs")]
    pub recovery_interval_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_dispatch_concurrency(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            idle_poll_ms: default_idle_poll_ms(),
            recovery_interval_secs: default_recovery_interval_secs(),
        }
    }
}

impl DispatchConfig {
    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    pub fn recovery_interval(&self) -> Duration {
        Duration::from_secs(self.recovery_interval_secs)
    }
}

fn default_dispatch_concurrency() -> usize {
    1
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_idle_poll_ms() -> u64 {
    500
}

fn default_recovery_interval_secs() -> u64 {
    60
}

/// Mapping resolver retry policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ResolverConfig {
    #[serde(default = "default_resolver_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_resolver_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Total time budget for retries; beyond it the resolver gives up.
    #[serde(default = "default_max_retry_window_secs")]
    pub max_retry_window_secs: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_resolver_attempts(),
            base_delay_ms: default_resolver_base_delay_ms(),
            max_retry_window_secs: default_max_retry_window_secs(),
        }
    }
}

impl ResolverConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_retry_window(&self) -> Duration {
        Duration::from_secs(self.max_retry_window_secs)
    }
}

fn default_resolver_attempts() -> u32 {
    5
}

fn default_resolver_base_delay_ms() -> u64 {
    500
}

fn default_max_retry_window_secs() -> u64 {
    30
}

/// Attachment pipeline limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AttachmentConfig {
    /// Per-file byte cap, enforced while streaming.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,

    #[serde(default = "default_max_files_per_batch")]
    pub max_files_per_batch: usize,

    /// Total bytes accepted across one batch.
    #[serde(default = "default_max_batch_bytes")]
    pub max_batch_bytes: u64,

    /// Downloads in flight at once.
    #[serde(default = "default_attachment_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,

    #[serde(default = "default_upload_timeout_secs")]
    pub upload_timeout_secs: u64,

    /// Attempts for the batched upload call.
    #[serde(default = "default_upload_attempts")]
    pub upload_attempts: u32,

    /// Buffers retained by the pool between runs.
    #[serde(default = "default_pool_max_buffers")]
    pub pool_max_buffers: usize,

    /// Retained pool bytes above which all buffers are released after a run.
    #[serde(default = "default_pool_release_threshold_bytes")]
    pub pool_release_threshold_bytes: u64,

    /// Private IPs that downloads may still connect to (e.g. an internal CDN).
    #[serde(default)]
    pub allowed_private_ips: Vec<String>,
}

impl Default for AttachmentConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: default_max_file_bytes(),
            max_files_per_batch: default_max_files_per_batch(),
            max_batch_bytes: default_max_batch_bytes(),
            concurrency: default_attachment_concurrency(),
            download_timeout_secs: default_download_timeout_secs(),
            upload_timeout_secs: default_upload_timeout_secs(),
            upload_attempts: default_upload_attempts(),
            pool_max_buffers: default_pool_max_buffers(),
            pool_release_threshold_bytes: default_pool_release_threshold_bytes(),
            allowed_private_ips: Vec::new(),
        }
    }
}

impl AttachmentConfig {
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }
}

fn default_max_file_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_max_files_per_batch() -> usize {
    10
}

fn default_max_batch_bytes() -> u64 {
    50 * 1024 * 1024
}

fn default_attachment_concurrency() -> usize {
    3
}

fn default_download_timeout_secs() -> u64 {
    15
}

fn default_upload_timeout_secs() -> u64 {
    30
}

fn default_upload_attempts() -> u32 {
    3
}

fn default_pool_max_buffers() -> usize {
    8
}

fn default_pool_release_threshold_bytes() -> u64 {
    32 * 1024 * 1024
}
