// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Attachment listings appended to ticket transcripts.
//!
//! The ticketing backend appends an `Attachments:` section to message text in
//! one of three forms: `<url|name>` pairs, markdown `[name](url)` links or a
//! comma-separated list. The files themselves travel as attachment events, so
//! the listing is removed before the text is posted.

use std::sync::LazyLock;

use regex::Regex;

static ATTACHMENT_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*Attachments:").expect("valid marker regex"));

/// Whether `text` contains an attachment section.
pub fn has_attachment_marker(text: &str) -> bool {
    ATTACHMENT_MARKER.is_match(text)
}

/// Drop everything from the first `Attachments:` line onward.
///
/// Text without a marker is returned unchanged; `None` or empty input gives
/// an empty string.
pub fn strip_attachment_section(text: Option<&str>) -> String {
    let Some(text) = text.filter(|t| !t.is_empty()) else {
        return String::new();
    };
    match ATTACHMENT_MARKER.find(text) {
        Some(marker) => text[..marker.start()].trim_end().to_string(),
        None => text.to_string(),
    }
}
