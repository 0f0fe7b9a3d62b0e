// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Courier event pipeline.
//!
//! This crate provides the error taxonomy, shared event/queue/mapping types,
//! dedup fingerprints, the backoff policy, and the collaborator traits
//! (event store, mapping store, chat platform, remote file source,
//! scheduler) that every other Courier crate is written against.

pub mod backoff;
pub mod error;
pub mod fingerprint;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use backoff::Backoff;
pub use error::{CourierError, ErrorClass, ResolveFailure};
pub use types::{AdapterType, EventType, HealthStatus, InboundEvent, Priority, QueueEntry};

pub use traits::{
    ChatPlatform, Clock, EventStore, MappingStore, PluginAdapter, RemoteFileSource, Scheduler,
    TokioScheduler,
};
