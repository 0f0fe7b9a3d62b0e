// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock remote file source with chunked bodies, failures and stalls.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::Mutex;

use courier_core::traits::{RemoteFile, RemoteFileSource};
use courier_core::CourierError;

const DEFAULT_CHUNK: usize = 8 * 1024;

/// How a URL behaves when fetched.
#[derive(Debug, Clone)]
pub enum MockFile {
    /// Serve these chunks, advertising `content_length` (which may lie).
    Body {
        chunks: Vec<Bytes>,
        content_length: Option<u64>,
    },
    /// Fail the fetch itself, permanently (a 4xx, say).
    Fail(String),
    /// Fail the fetch itself with a retryable error (a 503, say).
    Unavailable(String),
    /// Fail after the given chunks have been served, as a reset connection would.
    FailMidway { chunks: Vec<Bytes>, message: String },
    /// Open successfully but never yield a chunk.
    Stall,
}

impl MockFile {
    /// An honest body split into fixed-size chunks.
    pub fn bytes(data: impl Into<Bytes>) -> Self {
        let data: Bytes = data.into();
        let len = data.len() as u64;
        MockFile::Body {
            chunks: chunk(data),
            content_length: Some(len),
        }
    }

    /// A body whose advertised length is `claimed` regardless of the real size.
    pub fn lying(data: impl Into<Bytes>, claimed: Option<u64>) -> Self {
        MockFile::Body {
            chunks: chunk(data.into()),
            content_length: claimed,
        }
    }
}

fn chunk(data: Bytes) -> Vec<Bytes> {
    (0..data.len())
        .step_by(DEFAULT_CHUNK)
        .map(|start| data.slice(start..(start + DEFAULT_CHUNK).min(data.len())))
        .collect()
}

/// Counts one open download until dropped.
struct InFlight {
    count: Arc<AtomicUsize>,
}

impl InFlight {
    fn enter(count: &Arc<AtomicUsize>, peak: &AtomicUsize) -> Self {
        let now = count.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self {
            count: Arc::clone(count),
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A [`RemoteFileSource`] serving canned responses by URL.
///
/// A download counts as in flight from `fetch` until its body is dropped.
#[derive(Clone, Default)]
pub struct MockFileSource {
    files: Arc<Mutex<HashMap<String, MockFile>>>,
    fetched: Arc<Mutex<Vec<String>>>,
    bytes_served: Arc<AtomicU64>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

impl MockFileSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `data` at `url`.
    pub async fn serve(&self, url: &str, data: impl Into<Bytes>) {
        self.serve_with(url, MockFile::bytes(data)).await;
    }

    pub async fn serve_with(&self, url: &str, file: MockFile) {
        self.files.lock().await.insert(url.to_string(), file);
    }

    /// URLs fetched so far, in call order.
    pub async fn fetched(&self) -> Vec<String> {
        self.fetched.lock().await.clone()
    }

    /// Bytes actually pulled from bodies by consumers.
    pub fn bytes_served(&self) -> u64 {
        self.bytes_served.load(Ordering::SeqCst)
    }

    /// Downloads currently open.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Most downloads ever open at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn counted(
        &self,
        chunks: Vec<Bytes>,
        tail: Option<CourierError>,
        guard: InFlight,
    ) -> courier_core::traits::ByteStream {
        let served = Arc::clone(&self.bytes_served);
        let body = futures::stream::iter(chunks.into_iter().map(Ok))
            .chain(futures::stream::iter(tail.map(Err)))
            .inspect(move |item: &Result<Bytes, CourierError>| {
                let _open = &guard;
                if let Ok(chunk) = item {
                    served.fetch_add(chunk.len() as u64, Ordering::SeqCst);
                }
            });
        Box::pin(body)
    }
}

fn download_error(url: &str, message: String, retryable: bool) -> CourierError {
    CourierError::Download {
        url: url.to_string(),
        message,
        retryable,
    }
}

#[async_trait]
impl RemoteFileSource for MockFileSource {
    async fn fetch(&self, url: &str) -> Result<RemoteFile, CourierError> {
        let guard = InFlight::enter(&self.in_flight, &self.peak_in_flight);
        self.fetched.lock().await.push(url.to_string());
        let file = self.files.lock().await.get(url).cloned();

        match file {
            None => Err(download_error(url, "HTTP 404 Not Found".into(), false)),
            Some(MockFile::Fail(message)) => Err(download_error(url, message, false)),
            Some(MockFile::Unavailable(message)) => Err(download_error(url, message, true)),
            Some(MockFile::Body {
                chunks,
                content_length,
            }) => Ok(RemoteFile {
                content_length,
                body: self.counted(chunks, None, guard),
            }),
            Some(MockFile::FailMidway { chunks, message }) => Ok(RemoteFile {
                content_length: None,
                body: self.counted(chunks, Some(download_error(url, message, true)), guard),
            }),
            Some(MockFile::Stall) => Ok(RemoteFile {
                content_length: None,
                body: Box::pin(
                    futures::stream::pending::<Result<Bytes, CourierError>>().inspect(move |_| {
                        let _open = &guard;
                    }),
                ),
            }),
        }
    }
}
