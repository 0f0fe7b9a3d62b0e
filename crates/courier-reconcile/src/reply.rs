// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reply reconstruction from quoted plain text.
//!
//! Ticket transcripts carry replies as leading `>` lines that quote an
//! earlier message. When the quote matches a message already in the thread,
//! the quote is replaced by a native reply to that message.

use courier_core::types::KnownMessage;

use crate::duplicate::is_duplicate_message;
use crate::transcript::has_attachment_marker;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyExtraction {
    /// Id of the quoted message, when the quote matched one.
    pub reply_reference: Option<String>,
    pub content_to_send: String,
    /// The unquoted remainder repeats the quoted message.
    pub is_duplicate: bool,
}

impl ReplyExtraction {
    fn passthrough(text: &str) -> Self {
        Self {
            reply_reference: None,
            content_to_send: text.to_string(),
            is_duplicate: false,
        }
    }
}

/// Split the leading quote block from `text`.
///
/// Returns the quoted lines, each stripped of `>` and trimmed, and the
/// unquoted remainder. The block ends at the first line not starting with `>`.
pub fn split_quote(text: &str) -> (Vec<String>, &str) {
    let mut quoted = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let (line, tail) = match rest.find('\n') {
            Some(i) => (&rest[..i], &rest[i + 1..]),
            None => (rest, ""),
        };
        let Some(body) = line.trim_start().strip_prefix('>') else {
            break;
        };
        quoted.push(body.trim().to_string());
        rest = tail;
    }
    (quoted, rest)
}

/// Turn a leading quote of a known message into a reply reference.
pub fn extract_reply_reference(text: &str, prior: &[KnownMessage]) -> ReplyExtraction {
    let (quoted, remainder) = split_quote(text);
    if quoted.is_empty() {
        return ReplyExtraction::passthrough(text);
    }

    let block = quoted.join("\n");
    let block = block.trim();
    if block.is_empty() || has_attachment_marker(block) {
        return ReplyExtraction::passthrough(text);
    }

    let Some((target, id)) = prior.iter().find_map(|m| {
        let id = m.id.as_ref()?;
        (m.content.trim() == block).then_some((m, id))
    }) else {
        return ReplyExtraction::passthrough(text);
    };

    let remainder = remainder.trim();
    let content_to_send = if remainder.is_empty() {
        " ".to_string()
    } else {
        remainder.to_string()
    };
    let is_duplicate = is_duplicate_message(std::slice::from_ref(target), &content_to_send);

    ReplyExtraction {
        reply_reference: Some(id.clone()),
        content_to_send,
        is_duplicate,
    }
}
