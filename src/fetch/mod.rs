//! Resilient HTTP fetching for the catalog.
//!
//! This module wraps reqwest with the two behaviors every catalog request
//! needs: retry with a fixed delay on transient network failures, and manual
//! redirect following that keeps the hop trail visible. The trail matters
//! because the catalog redirects missing book IDs to its front page instead
//! of answering 404.
//!
//! # Example
//!
//! ```no_run
//! use tululu_core::fetch::Fetcher;
//! use tululu_core::ArchiveConfig;
//! use tokio_util::sync::CancellationToken;
//! use url::Url;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ArchiveConfig::default();
//! let fetcher = Fetcher::new(&config);
//! let url = Url::parse("https://tululu.org/b239/")?;
//! let outcome = fetcher.fetch(&url, &CancellationToken::new()).await?;
//! if outcome.availability().is_present() {
//!     println!("book 239 exists");
//! }
//! # Ok(())
//! # }
//! ```

mod availability;
mod client;
mod constants;
mod error;
mod retry;

pub use availability::Availability;
pub use client::{FetchOptions, FetchOutcome, Fetcher};
pub use constants::{CONNECT_TIMEOUT_SECS, MAX_REDIRECT_HOPS, READ_TIMEOUT_SECS};
pub use error::FetchError;
pub use retry::{
    DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_SECS, FailureType, RetryDecision, RetryPolicy,
    classify_error,
};
