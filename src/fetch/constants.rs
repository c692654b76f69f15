//! Constants for the fetch module (timeouts, redirect limits).

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large texts).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Maximum redirect hops followed before giving up on a URL.
///
/// The catalog answers missing IDs with a single hop to the front page, so
/// anything near this limit is a misbehaving server, not a real book.
pub const MAX_REDIRECT_HOPS: usize = 10;
