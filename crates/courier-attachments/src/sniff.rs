// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Magic-number sniffing and declared MIME normalisation.
//!
//! Only the leading bytes decide what a file is. The declared type is
//! checked against the sniffed one, never trusted on its own.

use strum::{Display, EnumString};

/// Image formats the pipeline accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
}

impl ImageFormat {
    pub fn mime(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Webp => "image/webp",
        }
    }

    /// Canonical file extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
            ImageFormat::Gif => "gif",
            ImageFormat::Webp => "webp",
        }
    }

    /// Extensions accepted as already agreeing with this format.
    pub fn accepts_extension(self, ext: &str) -> bool {
        let ext = ext.to_ascii_lowercase();
        match self {
            ImageFormat::Jpeg => matches!(ext.as_str(), "jpg" | "jpeg"),
            other => ext == other.extension(),
        }
    }

    fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "image/jpeg" => Some(ImageFormat::Jpeg),
            "image/png" => Some(ImageFormat::Png),
            "image/gif" => Some(ImageFormat::Gif),
            "image/webp" => Some(ImageFormat::Webp),
            _ => None,
        }
    }
}

const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF];
const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Identify the format from the file's leading bytes.
pub fn sniff(data: &[u8]) -> Option<ImageFormat> {
    if data.starts_with(JPEG) {
        Some(ImageFormat::Jpeg)
    } else if data.starts_with(PNG) {
        Some(ImageFormat::Png)
    } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        Some(ImageFormat::Gif)
    } else if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        Some(ImageFormat::Webp)
    } else {
        None
    }
}

/// Lowercase, strip parameters and resolve aliases.
///
/// `None` for a missing, empty or `application/octet-stream` declaration,
/// which carry no type information.
pub fn normalize_mime(declared: Option<&str>) -> Option<String> {
    let essence = declared?
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "" | "application/octet-stream" => None,
        "image/jpg" | "image/pjpeg" => Some("image/jpeg".to_string()),
        _ => Some(essence),
    }
}

/// Result of comparing a declared MIME type with the sniffed format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MimeCheck {
    /// Declared type agrees with the content.
    Consistent,
    /// No usable declaration; the sniffed format stands.
    Unknown,
    /// Declared a different image type than the content is.
    Conflict { declared: String },
    /// Declared a non-image type for image content.
    NotAnImage { declared: String },
}

pub fn check_declared(declared: Option<&str>, sniffed: ImageFormat) -> MimeCheck {
    let Some(declared) = normalize_mime(declared) else {
        return MimeCheck::Unknown;
    };
    match ImageFormat::from_mime(&declared) {
        Some(format) if format == sniffed => MimeCheck::Consistent,
        Some(_) => MimeCheck::Conflict { declared },
        None if declared.starts_with("image/") => MimeCheck::Conflict { declared },
        None => MimeCheck::NotAnImage { declared },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_known_signatures() {
        assert_eq!(sniff(&[0xFF, 0xD8, 0xFF, 0xE0, 0, 0]), Some(ImageFormat::Jpeg));
        assert_eq!(
            sniff(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0]),
            Some(ImageFormat::Png)
        );
        assert_eq!(sniff(b"GIF87a....."), Some(ImageFormat::Gif));
        assert_eq!(sniff(b"GIF89a....."), Some(ImageFormat::Gif));
        assert_eq!(sniff(b"RIFF\x10\x00\x00\x00WEBPVP8 "), Some(ImageFormat::Webp));
    }

    #[test]
    fn rejects_everything_else() {
        assert_eq!(sniff(b""), None);
        assert_eq!(sniff(b"%PDF-1.7"), None);
        assert_eq!(sniff(b"<svg xmlns"), None);
        assert_eq!(sniff(b"RIFF\x10\x00\x00\x00WAVEfmt "), None);
        assert_eq!(sniff(&[0xFF, 0xD8]), None);
        assert_eq!(sniff(b"MZ\x90\x00"), None);
    }

    #[test]
    fn normalises_declared_mime() {
        assert_eq!(normalize_mime(Some("IMAGE/PNG")), Some("image/png".into()));
        assert_eq!(
            normalize_mime(Some("image/jpeg; charset=binary")),
            Some("image/jpeg".into())
        );
        assert_eq!(normalize_mime(Some("image/jpg")), Some("image/jpeg".into()));
        assert_eq!(normalize_mime(Some("image/pjpeg")), Some("image/jpeg".into()));
        assert_eq!(normalize_mime(Some("application/octet-stream")), None);
        assert_eq!(normalize_mime(Some("  ")), None);
        assert_eq!(normalize_mime(None), None);
    }

    #[test]
    fn declared_type_is_cross_checked() {
        assert_eq!(check_declared(Some("image/jpg"), ImageFormat::Jpeg), MimeCheck::Consistent);
        assert_eq!(check_declared(None, ImageFormat::Png), MimeCheck::Unknown);
        assert_eq!(
            check_declared(Some("application/octet-stream"), ImageFormat::Gif),
            MimeCheck::Unknown
        );
        assert_eq!(
            check_declared(Some("image/png"), ImageFormat::Jpeg),
            MimeCheck::Conflict {
                declared: "image/png".into()
            }
        );
        assert_eq!(
            check_declared(Some("image/svg+xml"), ImageFormat::Png),
            MimeCheck::Conflict {
                declared: "image/svg+xml".into()
            }
        );
        assert_eq!(
            check_declared(Some("application/pdf"), ImageFormat::Png),
            MimeCheck::NotAnImage {
                declared: "application/pdf".into()
            }
        );
    }

    #[test]
    fn jpeg_accepts_both_extensions() {
        assert!(ImageFormat::Jpeg.accepts_extension("JPEG"));
        assert!(ImageFormat::Jpeg.accepts_extension("jpg"));
        assert!(!ImageFormat::Png.accepts_extension("jpg"));
    }
}
