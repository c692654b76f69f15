//! Filename derivation and sanitization for stored books.
//!
//! Book titles come straight from scraped HTML and image names from URL
//! paths, so everything is cleaned before it touches the filesystem.

use tracing::debug;
use url::Url;

/// Strips characters that are invalid on common filesystems:
/// `/ \ : * ? " < > |` plus control characters. Trailing dots and spaces are
/// trimmed as well; a name that ends up empty becomes `"_"`.
pub(crate) fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| {
            !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') && !c.is_control()
        })
        .collect();
    let cleaned = cleaned.trim_end_matches(['.', ' ']);

    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Filename for a book text: `{id}.{title}.txt`, sanitized as a whole.
pub(crate) fn text_filename(book_id: u32, title: &str) -> String {
    sanitize_filename(&format!("{book_id}.{title}.txt"))
}

/// Filename for a cover image: the last path segment of its URL,
/// percent-decoded and sanitized. Falls back to `{id}.img` when the URL
/// yields nothing usable.
pub(crate) fn image_filename(url: &Url, book_id: u32) -> String {
    let segment = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .map(|segment| match urlencoding::decode(segment) {
            Ok(decoded) => decoded.into_owned(),
            Err(error) => {
                debug!(segment, %error, "URL decoding failed, using raw segment");
                segment.to_string()
            }
        });

    match segment {
        Some(segment) => {
            let name = sanitize_filename(&segment);
            if name == "_" {
                format!("{book_id}.img")
            } else {
                name
            }
        }
        None => format!("{book_id}.img"),
    }
}
