// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Base adapter trait for components with a lifecycle.

use async_trait::async_trait;

use crate::error::CourierError;
use crate::types::{AdapterType, HealthStatus};

/// Identity, health and shutdown for long-lived adapters (storage, exporters).
#[async_trait]
pub trait PluginAdapter: Send + Sync + 'static {
    /// Stable identifier used in logs.
    fn name(&self) -> &str;

    fn version(&self) -> semver::Version;
    fn adapter_type(&self) -> AdapterType;

    async fn health_check(&self) -> Result<HealthStatus, CourierError>;

    /// Flush and close. Called once, after the last use.
    async fn shutdown(&self) -> Result<(), CourierError>;
}
