// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Filename sanitising for uploaded attachments.

use crate::sniff::ImageFormat;

pub const MAX_FILENAME_CHARS: usize = 100;
pub const FALLBACK_STEM: &str = "attachment";

fn allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}

/// Make `name` safe to upload and give it the extension of `format`.
///
/// The result contains only `[A-Za-z0-9._-]`, never starts with a dot,
/// never contains `..` and is at most [`MAX_FILENAME_CHARS`] long.
pub fn sanitize_filename(name: &str, format: ImageFormat) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();

    let mut cleaned = String::with_capacity(base.len());
    for c in base.chars() {
        let c = if allowed(c) { c } else { '_' };
        let repeat = matches!(c, '_' | '.') && cleaned.ends_with(c);
        if !repeat {
            cleaned.push(c);
        }
    }
    let cleaned = cleaned.trim_start_matches('.');

    let (stem, ext) = match cleaned.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && (1..=5).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            (stem, Some(ext))
        }
        _ => (cleaned, None),
    };

    let ext = match ext {
        Some(ext) if format.accepts_extension(ext) => ext.to_ascii_lowercase(),
        _ => format.extension().to_string(),
    };

    let stem = stem.trim_end_matches(['.', '_']);
    let stem = if stem.is_empty() { FALLBACK_STEM } else { stem };
    let max_stem = MAX_FILENAME_CHARS - ext.len() - 1;
    let stem = &stem[..stem.len().min(max_stem)];
    let stem = stem.trim_end_matches('.');

    format!("{stem}.{ext}")
}
