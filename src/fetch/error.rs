//! Error types for the fetch module.
//!
//! This module defines structured errors for all HTTP operations,
//! providing context-rich error messages for debugging and user feedback.

use thiserror::Error;

/// Errors that can occur while fetching catalog resources.
///
/// A redirect is deliberately NOT an error: the catalog uses redirects to
/// signal missing books, so redirect handling lives in
/// [`super::Availability`] instead of this enum.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The server kept redirecting past the hop limit.
    #[error("more than {limit} redirects fetching {url}")]
    TooManyRedirects {
        /// The originally requested URL.
        url: String,
        /// The hop limit that was exceeded.
        limit: usize,
    },

    /// A URL could not be built or a redirect target could not be resolved.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The run was cancelled while this fetch was in flight.
    #[error("fetch cancelled")]
    Cancelled,
}

impl FetchError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a redirect-limit error.
    pub fn too_many_redirects(url: impl Into<String>, limit: usize) -> Self {
        Self::TooManyRedirects {
            url: url.into(),
            limit,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }
}

// Note on From trait implementations:
// We intentionally do NOT implement `From<reqwest::Error>` because our error
// variants require context (the URL) that the source error does not reliably
// provide. The helper constructors are the correct pattern here.
