// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Duplicate delivery detection against a thread's recent messages.

use courier_core::types::KnownMessage;

/// Trimmed content shorter than this is never treated as a duplicate.
pub const MIN_DUPLICATE_CHARS: usize = 5;

/// Trimmed content must be at least this long for fuzzy matching.
pub const MIN_FUZZY_CHARS: usize = 10;

/// Minimum `shorter / longer` character ratio for a containment match.
pub const FUZZY_RATIO: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Identical after trimming.
    Exact,
    /// One contains the other after whitespace normalisation.
    Fuzzy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateMatch {
    pub message_id: Option<String>,
    pub kind: MatchKind,
}

/// Find the prior message `content` duplicates, preferring exact matches.
pub fn find_duplicate(prior: &[KnownMessage], content: &str) -> Option<DuplicateMatch> {
    let content = content.trim();
    let chars = content.chars().count();
    if chars < MIN_DUPLICATE_CHARS {
        return None;
    }

    if let Some(exact) = prior.iter().find(|m| m.content.trim() == content) {
        return Some(DuplicateMatch {
            message_id: exact.id.clone(),
            kind: MatchKind::Exact,
        });
    }

    if chars < MIN_FUZZY_CHARS {
        return None;
    }
    let normalized = collapse_whitespace(content);
    prior
        .iter()
        .find(|m| is_fuzzy_match(&normalized, &collapse_whitespace(m.content.trim())))
        .map(|m| DuplicateMatch {
            message_id: m.id.clone(),
            kind: MatchKind::Fuzzy,
        })
}

pub fn is_duplicate_message(prior: &[KnownMessage], content: &str) -> bool {
    find_duplicate(prior, content).is_some()
}

fn is_fuzzy_match(a: &str, b: &str) -> bool {
    let (shorter, longer) = if a.chars().count() <= b.chars().count() {
        (a, b)
    } else {
        (b, a)
    };
    let longer_chars = longer.chars().count();
    if shorter.is_empty() || longer_chars == 0 || !longer.contains(shorter) {
        return false;
    }
    shorter.chars().count() as f64 / longer_chars as f64 >= FUZZY_RATIO
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
