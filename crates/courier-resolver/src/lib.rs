// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resolves an external ticket id to the chat thread carrying its conversation.
//!
//! The ticketing backend can emit events for a ticket before the ticket's
//! thread mapping has been persisted. [`MappingResolver::resolve_with_retry`]
//! absorbs that race with bounded exponential backoff and reports whether an
//! eventual failure looks like the race or like a real outage.

pub mod resolver;

pub use resolver::{MappingLookup, MappingResolver, ResolvedThread, RetryOptions};
