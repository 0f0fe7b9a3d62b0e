// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event handlers that carry ticket events into chat threads.
//!
//! Each handler resolves the ticket's thread, does its work and reports the
//! result as a [`HandlerOutcome`](courier_dispatch::HandlerOutcome); retry
//! and dead-letter decisions stay with the dispatcher.

pub mod attachment;
pub mod message;
pub mod payload;
pub mod status;
pub mod thread;

use std::sync::Arc;

use courier_attachments::AttachmentPipeline;
use courier_core::{ChatPlatform, EventType, MappingStore};
use courier_dispatch::Dispatcher;
use courier_resolver::{MappingResolver, RetryOptions};

pub use attachment::AttachmentHandler;
pub use message::{Delivery, MessageHandler};
pub use status::StatusHandler;
pub use thread::ThreadCreateHandler;

/// Prior thread messages consulted for duplicates and quoted replies.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Shared collaborators for every handler.
#[derive(Clone)]
pub struct BridgeDeps {
    pub resolver: Arc<MappingResolver>,
    pub mappings: Arc<dyn MappingStore>,
    pub chat: Arc<dyn ChatPlatform>,
    pub pipeline: Arc<AttachmentPipeline>,
    pub retry: RetryOptions,
    pub history_limit: usize,
}

/// Register a handler for every [`EventType`].
pub fn register_all(dispatcher: &mut Dispatcher, deps: &BridgeDeps) {
    dispatcher.register(
        EventType::MessageCreated,
        Arc::new(MessageHandler::new(
            Arc::clone(&deps.resolver),
            Arc::clone(&deps.chat),
            deps.retry,
            deps.history_limit,
        )),
    );
    dispatcher.register(
        EventType::Attachment,
        Arc::new(AttachmentHandler::new(
            Arc::clone(&deps.resolver),
            Arc::clone(&deps.pipeline),
            deps.retry,
        )),
    );
    dispatcher.register(
        EventType::ConversationUpdated,
        Arc::new(StatusHandler::new(
            Arc::clone(&deps.resolver),
            Arc::clone(&deps.chat),
            deps.retry,
        )),
    );
    dispatcher.register(
        EventType::ThreadCreate,
        Arc::new(ThreadCreateHandler::new(
            Arc::clone(&deps.mappings),
            Arc::clone(&deps.chat),
        )),
    );
}
