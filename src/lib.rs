//! Tululu Archiver Core Library
//!
//! This library downloads books from the tululu.org free library: for each
//! numeric book ID in a range it fetches the catalog page, extracts the book
//! metadata, and stores the full text and the cover image under deterministic
//! filenames.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`config`] - Explicit run configuration (base URL, output layout, knobs)
//! - [`fetch`] - Resilient HTTP fetching with redirect-based absence detection
//! - [`page`] - Book page parsing into [`page::BookMetadata`]
//! - [`persist`] - Streamed file persistence with sanitized filenames
//! - [`engine`] - Per-ID acquisition pipeline over a bounded worker pool
//! - [`report`] - Console output for archived books
//!
//! The site signals "no such book" by redirecting to its landing page instead
//! of returning 404, so availability is decided from the redirect history of
//! each response rather than from the status code.

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod engine;
pub mod fetch;
pub mod page;
pub mod persist;
pub mod report;
mod user_agent;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use config::ArchiveConfig;
pub use engine::{ArchiveStats, BookError, BookOutcome, DEFAULT_CONCURRENCY, Engine, EngineError};
pub use fetch::{
    Availability, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_SECS, FetchError, FetchOptions,
    FetchOutcome, Fetcher, RetryPolicy,
};
pub use page::{BookMetadata, ParseError, parse_book_page};
pub use persist::{FileKind, PersistError, StoredFile};
pub use report::Reporter;
