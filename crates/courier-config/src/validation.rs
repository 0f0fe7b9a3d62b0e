// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Collects every violation instead of stopping at the first one.

use std::net::IpAddr;

use crate::diagnostic::ConfigError;
use crate::model::CourierConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
pub fn validate_config(config: &CourierConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&config.service.log_level.as_str()) {
        errors.push(ConfigError::validation(format!(
            "service.log_level `{}` is not one of {}",
            config.service.log_level,
            LOG_LEVELS.join(", ")
        )));
    }

    if config.service.consumer_id.trim().is_empty() {
        errors.push(ConfigError::validation(
            "service.consumer_id must not be empty",
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::validation(
            "storage.database_path must not be empty",
        ));
    }

    let queue = &config.queue;
    if queue.max_retries < 1 {
        errors.push(ConfigError::validation(
            "queue.max_retries must be at least 1",
        ));
    }
    if queue.dedup_ttl_secs == 0 {
        errors.push(ConfigError::validation(
            "queue.dedup_ttl_secs must be greater than 0",
        ));
    }
    if queue.processing_lease_secs == 0 {
        errors.push(ConfigError::validation(
            "queue.processing_lease_secs must be greater than 0",
        ));
    }

    let dispatch = &config.dispatch;
    if dispatch.concurrency == 0 {
        errors.push(ConfigError::validation(
            "dispatch.concurrency must be at least 1",
        ));
    }
    if dispatch.base_delay_ms == 0 {
        errors.push(ConfigError::validation(
            "dispatch.base_delay_ms must be greater than 0",
        ));
    }
    if dispatch.max_delay_ms < dispatch.base_delay_ms {
        errors.push(ConfigError::validation(format!(
            "dispatch.max_delay_ms ({}) must be >= dispatch.base_delay_ms ({})",
            dispatch.max_delay_ms, dispatch.base_delay_ms
        )));
    }

    let resolver = &config.resolver;
    if resolver.max_attempts < 1 {
        errors.push(ConfigError::validation(
            "resolver.max_attempts must be at least 1",
        ));
    }
    if resolver.max_retry_window_secs == 0 {
        errors.push(ConfigError::validation(
            "resolver.max_retry_window_secs must be greater than 0",
        ));
    }

    let attachments = &config.attachments;
    if attachments.max_file_bytes == 0 {
        errors.push(ConfigError::validation(
            "attachments.max_file_bytes must be greater than 0",
        ));
    }
    if attachments.max_batch_bytes < attachments.max_file_bytes {
        errors.push(ConfigError::validation(format!(
            "attachments.max_batch_bytes ({}) must be >= attachments.max_file_bytes ({})",
            attachments.max_batch_bytes, attachments.max_file_bytes
        )));
    }
    if attachments.max_files_per_batch == 0 {
        errors.push(ConfigError::validation(
            "attachments.max_files_per_batch must be at least 1",
        ));
    }
    if attachments.concurrency == 0 {
        errors.push(ConfigError::validation(
            "attachments.concurrency must be at least 1",
        ));
    }
    if attachments.upload_attempts == 0 {
        errors.push(ConfigError::validation(
            "attachments.upload_attempts must be at least 1",
        ));
    }
    if attachments.download_timeout_secs == 0 || attachments.upload_timeout_secs == 0 {
        errors.push(ConfigError::validation(
            "attachments timeouts must be greater than 0",
        ));
    }
    for ip in &attachments.allowed_private_ips {
        if ip.parse::<IpAddr>().is_err() {
            errors.push(ConfigError::validation(format!(
                "attachments.allowed_private_ips entry `{ip}` is not a valid IP address"
            )));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
