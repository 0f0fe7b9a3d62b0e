// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue consumer for the Courier event pipeline.
//!
//! Handlers implement [`EventHandler`] and are registered per
//! [`EventType`](courier_core::EventType) on a [`Dispatcher`], which owns
//! every ack/requeue/dead-letter decision.

pub mod dispatcher;
pub mod handler;

pub use dispatcher::{Dispatcher, DispatcherOptions, SweepReport, Transition};
pub use handler::{EventHandler, HandlerOutcome};
