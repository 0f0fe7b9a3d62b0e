// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message reconciliation for plain-text ticket transcripts.
//!
//! Pure functions over message text and the thread's recent history:
//! duplicate detection, attachment-section stripping and reply
//! reconstruction from leading `>` quotes. [`reconcile`] composes them for
//! the message handler.

pub mod duplicate;
pub mod reply;
pub mod transcript;

use courier_core::types::KnownMessage;

pub use duplicate::{DuplicateMatch, MatchKind, find_duplicate, is_duplicate_message};
pub use reply::{ReplyExtraction, extract_reply_reference, split_quote};
pub use transcript::{has_attachment_marker, strip_attachment_section};

/// Everything the message handler needs to decide what to post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationContext {
    /// Leading quoted lines, stripped of `>` and trimmed.
    pub candidate_quote_lines: Vec<String>,
    /// Message the quote was matched to, if any.
    pub matched_message_id: Option<String>,
    /// Text to post.
    pub remainder_text: String,
    /// The message already exists in the thread and must not be posted.
    pub is_duplicate: bool,
}

/// Strip the attachment listing, resolve a quoted reply and check for a
/// duplicate delivery against `prior`.
pub fn reconcile(text: &str, prior: &[KnownMessage]) -> ReconciliationContext {
    let stripped = strip_attachment_section(Some(text));
    let (candidate_quote_lines, _) = split_quote(&stripped);
    let extraction = extract_reply_reference(&stripped, prior);
    let is_duplicate =
        extraction.is_duplicate || is_duplicate_message(prior, &extraction.content_to_send);

    ReconciliationContext {
        candidate_quote_lines,
        matched_message_id: extraction.reply_reference,
        remainder_text: extraction.content_to_send,
        is_duplicate,
    }
}
