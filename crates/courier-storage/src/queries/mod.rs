// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules, one per table group.

pub mod dead_letters;
pub mod mappings;
pub mod queue;
