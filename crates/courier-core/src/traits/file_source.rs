// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Remote file source used by the attachment pipeline.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_core::Stream;

use crate::error::CourierError;

/// A chunked response body. Dropping the stream aborts the transfer.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, CourierError>> + Send>>;

/// An opened remote file.
pub struct RemoteFile {
    /// Length advertised by the server, if any. Not trusted.
    pub content_length: Option<u64>,
    pub body: ByteStream,
}

impl std::fmt::Debug for RemoteFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteFile")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Opens remote URLs for streaming download.
#[async_trait]
pub trait RemoteFileSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<RemoteFile, CourierError>;
}
