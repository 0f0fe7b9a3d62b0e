// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Attachment pipeline for Courier.
//!
//! Attachment URLs arrive from the ticketing backend and are never trusted:
//! every file is downloaded under a byte ceiling, sniffed by content,
//! renamed to a safe name with the right extension and only then uploaded
//! to the ticket's thread.

pub mod filename;
pub mod http;
pub mod pipeline;
pub mod pool;
pub mod rejection;
pub mod sniff;
pub mod ssrf;

pub use http::HttpFileSource;
pub use pipeline::{
    AcceptedSummary, AttachmentLimits, AttachmentPipeline, BatchReport, RejectedFile,
    ValidatedBatch,
};
pub use pool::BufferPool;
pub use rejection::RejectionReason;
pub use sniff::ImageFormat;
