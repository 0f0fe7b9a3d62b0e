// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Courier crates.
//!
//! In-memory stand-ins for the collaborator traits plus a virtual-clock
//! scheduler, so pipeline tests run deterministically without a network or
//! real sleeps.

pub mod mock_chat;
pub mod mock_files;
pub mod mock_mapping;
pub mod scheduler;

pub use mock_chat::{MockChatPlatform, SentMessage};
pub use mock_files::{MockFile, MockFileSource};
pub use mock_mapping::MemoryMappingStore;
pub use scheduler::ManualScheduler;
