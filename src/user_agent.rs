//! Shared User-Agent string for archiver HTTP traffic.
//!
//! Single source for the UA format so every request identifies the tool the
//! same way and the format stays easy to update (good citizenship; RFC 9308).

/// Project URL for User-Agent identification (good citizenship; RFC 9308).
const PROJECT_UA_URL: &str = "https://github.com/tululu-tools/tululu";

/// Default User-Agent for archiver requests (identifies the tool).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("tululu/{version} (book-archiver; +{PROJECT_UA_URL})")
}
