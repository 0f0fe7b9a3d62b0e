// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Download, validate and upload one batch of attachments.
//!
//! Each file is streamed into a pooled buffer under a byte ceiling, sniffed,
//! cross-checked against its declared type and renamed. Files that pass are
//! admitted in input order against the batch byte cap and uploaded together
//! in one message. A rejected file never stops the rest of the batch.
//!
//! A download that failed for a reason that may clear up (timeout, reset
//! connection, 5xx) is not a rejection: nothing is uploaded and the batch is
//! handed back as a transient error to be redelivered whole.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tracing::{debug, warn};

use courier_config::model::AttachmentConfig;
use courier_core::types::{AttachmentDescriptor, MessageId, OutboundMessage, ThreadHandle, UploadFile};
use courier_core::{Backoff, ChatPlatform, CourierError, RemoteFileSource, Scheduler};
use courier_prometheus::recording;

use crate::filename::sanitize_filename;
use crate::pool::BufferPool;
use crate::rejection::RejectionReason;
use crate::sniff::{ImageFormat, MimeCheck, check_declared, sniff};

/// Per-batch limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentLimits {
    pub max_file_bytes: u64,
    pub max_files_per_batch: usize,
    pub max_batch_bytes: u64,
    pub concurrency: usize,
    pub download_timeout: Duration,
    pub upload_timeout: Duration,
    pub upload_attempts: u32,
}

impl AttachmentLimits {
    pub fn from_config(config: &AttachmentConfig) -> Self {
        Self {
            max_file_bytes: config.max_file_bytes,
            max_files_per_batch: config.max_files_per_batch,
            max_batch_bytes: config.max_batch_bytes,
            concurrency: config.concurrency.max(1),
            download_timeout: config.download_timeout(),
            upload_timeout: config.upload_timeout(),
            upload_attempts: config.upload_attempts.max(1),
        }
    }
}

impl Default for AttachmentLimits {
    fn default() -> Self {
        Self::from_config(&AttachmentConfig::default())
    }
}

/// A file that passed every check. Only these are ever uploaded.
#[derive(Debug)]
pub struct AcceptedFile {
    /// Position in the input batch.
    pub index: usize,
    pub source_url: String,
    /// Sanitized name with an extension matching `format`.
    pub filename: String,
    pub format: ImageFormat,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedFile {
    pub index: usize,
    pub source_url: String,
    /// Name as declared by the sender.
    pub filename: String,
    pub reason: RejectionReason,
}

/// Outcome of validating one file.
#[derive(Debug)]
pub enum Verdict {
    Accepted(AcceptedFile),
    Rejected(RejectedFile),
}

#[derive(Debug, Default)]
pub struct ValidatedBatch {
    /// In input order.
    pub accepted: Vec<AcceptedFile>,
    /// In input order.
    pub rejected: Vec<RejectedFile>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedSummary {
    pub index: usize,
    pub filename: String,
    pub mime_type: &'static str,
    pub size: u64,
}

/// What happened to each file of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BatchReport {
    pub accepted: Vec<AcceptedSummary>,
    pub rejected: Vec<RejectedFile>,
    /// Set when the accepted files were uploaded.
    pub message_id: Option<MessageId>,
}

impl BatchReport {
    pub fn accepted_bytes(&self) -> u64 {
        self.accepted.iter().map(|a| a.size).sum()
    }
}

/// The attachment pipeline. Cheap to share behind an `Arc`.
pub struct AttachmentPipeline {
    files: Arc<dyn RemoteFileSource>,
    chat: Arc<dyn ChatPlatform>,
    scheduler: Arc<dyn Scheduler>,
    pool: Arc<BufferPool>,
    limits: AttachmentLimits,
    backoff: Backoff,
}

impl AttachmentPipeline {
    pub fn new(
        files: Arc<dyn RemoteFileSource>,
        chat: Arc<dyn ChatPlatform>,
        scheduler: Arc<dyn Scheduler>,
        pool: Arc<BufferPool>,
        limits: AttachmentLimits,
        backoff: Backoff,
    ) -> Self {
        Self {
            files,
            chat,
            scheduler,
            pool,
            limits,
            backoff,
        }
    }

    pub fn limits(&self) -> &AttachmentLimits {
        &self.limits
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Validate a batch and upload whatever passed into `thread`.
    ///
    /// Rejections are reported, not returned as errors. A transient download
    /// failure returns [`CourierError::Timeout`] or a retryable
    /// [`CourierError::Download`] before anything is uploaded. An upload that
    /// fails after every attempt is a transient [`CourierError::Upload`]; a
    /// non-retryable chat error is returned as is.
    pub async fn process(
        &self,
        thread: &ThreadHandle,
        batch: &[AttachmentDescriptor],
        caption: Option<String>,
    ) -> Result<BatchReport, CourierError> {
        let ValidatedBatch { accepted, rejected } = self.validate(batch).await;

        if let Some(first) = rejected.iter().find(|r| r.reason.is_transient()) {
            let transient = rejected.iter().filter(|r| r.reason.is_transient()).count();
            warn!(
                thread_id = %thread.id,
                transient,
                url = %first.source_url,
                "attachment download may succeed later, holding the batch back"
            );
            let err = match &first.reason {
                RejectionReason::DownloadTimeout(duration) => CourierError::Timeout {
                    duration: *duration,
                },
                reason => CourierError::Download {
                    url: first.source_url.clone(),
                    message: reason.to_string(),
                    retryable: true,
                },
            };
            for file in accepted {
                self.pool.release(file.data);
            }
            self.pool.trim();
            return Err(err);
        }

        let summaries: Vec<AcceptedSummary> = accepted
            .iter()
            .map(|f| AcceptedSummary {
                index: f.index,
                filename: f.filename.clone(),
                mime_type: f.format.mime(),
                size: f.data.len() as u64,
            })
            .collect();

        if accepted.is_empty() {
            self.pool.trim();
            return Ok(BatchReport {
                accepted: summaries,
                rejected,
                message_id: None,
            });
        }

        let message = OutboundMessage {
            content: caption,
            reply_to: None,
            files: accepted
                .into_iter()
                .map(|f| UploadFile {
                    filename: f.filename,
                    mime_type: f.format.mime().to_string(),
                    data: f.data,
                })
                .collect(),
        };
        let uploaded = self.upload(thread, &message).await;
        for file in message.files {
            self.pool.release(file.data);
        }
        self.pool.trim();

        let message_id = uploaded?;
        debug!(
            thread_id = %thread.id,
            accepted = summaries.len(),
            rejected = rejected.len(),
            "attachment batch uploaded"
        );
        Ok(BatchReport {
            accepted: summaries,
            rejected,
            message_id: Some(message_id),
        })
    }

    /// Download and check every file without uploading anything.
    pub async fn validate(&self, batch: &[AttachmentDescriptor]) -> ValidatedBatch {
        let cutoff = batch.len().min(self.limits.max_files_per_batch);
        let (within, beyond) = batch.split_at(cutoff);

        // Futures are built up front (they stay lazy until `buffered` polls
        // them); a `.map` closure here is not general enough over lifetimes
        // for the handler future to be `Send`.
        let checks: Vec<_> = within
            .iter()
            .enumerate()
            .map(|(index, descriptor)| self.check(index, descriptor))
            .collect();
        let verdicts: Vec<Verdict> = futures::stream::iter(checks)
            .buffered(self.limits.concurrency.max(1))
            .collect()
            .await;

        let mut result = ValidatedBatch::default();
        let mut admitted_bytes = 0u64;
        for verdict in verdicts {
            match verdict {
                Verdict::Accepted(file) => {
                    let size = file.data.len() as u64;
                    if admitted_bytes + size > self.limits.max_batch_bytes {
                        self.pool.release(file.data);
                        result.rejected.push(RejectedFile {
                            index: file.index,
                            source_url: file.source_url,
                            filename: batch[file.index].filename.clone(),
                            reason: RejectionReason::ExceedsBatchLimit {
                                size,
                                limit: self.limits.max_batch_bytes,
                            },
                        });
                    } else {
                        admitted_bytes += size;
                        result.accepted.push(file);
                    }
                }
                Verdict::Rejected(rejected) => result.rejected.push(rejected),
            }
        }

        for (offset, descriptor) in beyond.iter().enumerate() {
            result.rejected.push(RejectedFile {
                index: cutoff + offset,
                source_url: descriptor.url.clone(),
                filename: descriptor.filename.clone(),
                reason: RejectionReason::TooManyFiles {
                    limit: self.limits.max_files_per_batch,
                },
            });
        }
        result.rejected.sort_by_key(|r| r.index);

        for _ in &result.accepted {
            recording::record_attachment("accepted");
        }
        for rejected in &result.rejected {
            recording::record_attachment(rejected.reason.label());
            warn!(
                url = %rejected.source_url,
                filename = %rejected.filename,
                reason = rejected.reason.label(),
                "attachment rejected: {}",
                rejected.reason
            );
        }
        result
    }

    async fn check(&self, index: usize, descriptor: &AttachmentDescriptor) -> Verdict {
        let reject = |reason| {
            Verdict::Rejected(RejectedFile {
                index,
                source_url: descriptor.url.clone(),
                filename: descriptor.filename.clone(),
                reason,
            })
        };

        if let Some(declared) = descriptor.declared_size
            && declared > self.limits.max_file_bytes
        {
            return reject(RejectionReason::DeclaredTooLarge {
                declared,
                limit: self.limits.max_file_bytes,
            });
        }

        let mut buffer = self.pool.acquire();
        let downloaded = tokio::time::timeout(
            self.limits.download_timeout,
            self.download(&descriptor.url, &mut buffer),
        )
        .await
        .unwrap_or(Err(RejectionReason::DownloadTimeout(self.limits.download_timeout)));
        if let Err(reason) = downloaded {
            self.pool.release(buffer);
            return reject(reason);
        }

        let Some(format) = sniff(&buffer) else {
            self.pool.release(buffer);
            return reject(RejectionReason::UnsupportedFormat);
        };

        match check_declared(descriptor.declared_mime.as_deref(), format) {
            MimeCheck::Consistent | MimeCheck::Unknown => {}
            MimeCheck::Conflict { declared } | MimeCheck::NotAnImage { declared } => {
                self.pool.release(buffer);
                return reject(RejectionReason::MimeMismatch {
                    declared,
                    detected: format.mime(),
                });
            }
        }

        Verdict::Accepted(AcceptedFile {
            index,
            source_url: descriptor.url.clone(),
            filename: sanitize_filename(&descriptor.filename, format),
            format,
            data: buffer,
        })
    }

    /// Stream `url` into `buffer`, aborting as soon as the ceiling is crossed.
    async fn download(&self, url: &str, buffer: &mut Vec<u8>) -> Result<(), RejectionReason> {
        let limit = self.limits.max_file_bytes;
        let file = self.files.fetch(url).await.map_err(download_failure)?;

        if let Some(advertised) = file.content_length {
            if advertised > limit {
                return Err(RejectionReason::TooLarge { limit });
            }
            buffer.reserve(advertised as usize);
        }

        let mut body = file.body;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(download_failure)?;
            if buffer.len() as u64 + chunk.len() as u64 > limit {
                debug!(url, limit, "download exceeded the per-file limit");
                return Err(RejectionReason::TooLarge { limit });
            }
            buffer.extend_from_slice(&chunk);
        }
        Ok(())
    }

    async fn upload(
        &self,
        thread: &ThreadHandle,
        message: &OutboundMessage,
    ) -> Result<MessageId, CourierError> {
        let attempts = self.limits.upload_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let sent = tokio::time::timeout(
                self.limits.upload_timeout,
                self.chat.send_to_thread(thread, message),
            )
            .await;
            match sent {
                Ok(Ok(id)) => return Ok(id),
                Ok(Err(e)) if !e.is_transient() => return Err(e),
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => {
                    last_error = format!("timed out after {:?}", self.limits.upload_timeout)
                }
            }

            if attempt < attempts {
                let delay = self.backoff.delay(attempt - 1);
                warn!(
                    thread_id = %thread.id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %last_error,
                    "attachment upload failed, retrying"
                );
                self.scheduler.after(delay).await;
            }
        }

        Err(CourierError::Upload {
            message: format!("{attempts} attempt(s) failed, last: {last_error}"),
        })
    }
}

fn download_failure(err: CourierError) -> RejectionReason {
    match err {
        CourierError::Download {
            message, retryable, ..
        } => RejectionReason::DownloadFailed { message, retryable },
        other => RejectionReason::DownloadFailed {
            retryable: other.is_transient(),
            message: other.to_string(),
        },
    }
}
