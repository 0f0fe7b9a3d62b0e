// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `attachment`: validate a batch of files and upload what passes.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use courier_attachments::{AttachmentPipeline, BatchReport};
use courier_core::{CourierError, InboundEvent};
use courier_dispatch::{EventHandler, HandlerOutcome};
use courier_resolver::{MappingResolver, RetryOptions};

use crate::payload::{AttachmentPayload, parse};

pub struct AttachmentHandler {
    resolver: Arc<MappingResolver>,
    pipeline: Arc<AttachmentPipeline>,
    retry: RetryOptions,
}

impl AttachmentHandler {
    pub fn new(
        resolver: Arc<MappingResolver>,
        pipeline: Arc<AttachmentPipeline>,
        retry: RetryOptions,
    ) -> Self {
        Self {
            resolver,
            pipeline,
            retry,
        }
    }

    /// Rejected files are part of the report. Resolution failures, upload
    /// failures and downloads that may succeed later are errors.
    pub async fn deliver(&self, event: &InboundEvent) -> Result<BatchReport, CourierError> {
        let payload: AttachmentPayload = parse(event)?;
        if payload.attachments.is_empty() {
            return Err(CourierError::invalid_payload(
                event.event_type,
                "attachment batch is empty",
            ));
        }

        let resolved = self
            .resolver
            .resolve_with_retry(&event.ticket_id, self.retry, None)
            .await?;
        let report = self
            .pipeline
            .process(&resolved.thread, &payload.attachments, payload.caption)
            .await?;

        if report.accepted.is_empty() {
            warn!(
                ticket_id = %event.ticket_id,
                event_id = %event.id,
                rejected = report.rejected.len(),
                "no attachment in the batch passed validation"
            );
        } else {
            info!(
                ticket_id = %event.ticket_id,
                thread_id = %resolved.thread.id,
                accepted = report.accepted.len(),
                rejected = report.rejected.len(),
                bytes = report.accepted_bytes(),
                "attachments delivered"
            );
        }
        Ok(report)
    }
}

#[async_trait]
impl EventHandler for AttachmentHandler {
    async fn handle(&self, event: &InboundEvent) -> HandlerOutcome {
        self.deliver(event).await.map(|_| ()).into()
    }
}
