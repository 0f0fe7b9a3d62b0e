// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator traits the pipeline depends on.
//!
//! Every capability is injected as `Arc<dyn Trait>` at construction time;
//! nothing in the pipeline reaches for an ambient client.

pub mod adapter;
pub mod chat;
pub mod file_source;
pub mod mapping;
pub mod queue;
pub mod scheduler;

pub use adapter::PluginAdapter;
pub use chat::ChatPlatform;
pub use file_source::{ByteStream, RemoteFile, RemoteFileSource};
pub use mapping::MappingStore;
pub use queue::EventStore;
pub use scheduler::{Clock, Scheduler, TokioScheduler};
