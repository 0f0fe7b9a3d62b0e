// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-file rejection reasons.

use std::time::Duration;

use strum::IntoStaticStr;
use thiserror::Error;

/// Why a file in a batch was not uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Error, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum RejectionReason {
    #[error("batch already holds the maximum of {limit} files")]
    TooManyFiles { limit: usize },

    #[error("declared size {declared} exceeds the per-file limit of {limit} bytes")]
    DeclaredTooLarge { declared: u64, limit: u64 },

    #[error("file exceeds the per-file limit of {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("accepting {size} more bytes would exceed the batch limit of {limit} bytes")]
    ExceedsBatchLimit { size: u64, limit: u64 },

    #[error("file signature is not a supported image format")]
    UnsupportedFormat,

    #[error("declared type {declared} does not match detected {detected}")]
    MimeMismatch {
        declared: String,
        detected: &'static str,
    },

    #[error("download failed: {message}")]
    DownloadFailed { message: String, retryable: bool },

    #[error("download timed out after {0:?}")]
    DownloadTimeout(Duration),
}

impl RejectionReason {
    /// Stable snake_case label for metrics and reports.
    pub fn label(&self) -> &'static str {
        self.into()
    }

    /// Whether fetching the file again later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            RejectionReason::DownloadTimeout(_) => true,
            RejectionReason::DownloadFailed { retryable, .. } => *retryable,
            _ => false,
        }
    }
}
