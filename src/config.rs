//! Run configuration for the archiver.
//!
//! All knobs live in one explicit struct handed to [`crate::Engine`] at
//! construction, so tests can point a run at a mock origin and a temp
//! directory instead of the real site and the working directory.

use std::path::{Path, PathBuf};

use url::Url;

use crate::fetch::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS, RetryPolicy};

/// Catalog origin the tool archives from.
pub const DEFAULT_BASE_URL: &str = "https://tululu.org";

/// Subdirectory for downloaded book texts.
const BOOKS_SUBDIR: &str = "book";

/// Subdirectory for downloaded cover images.
const IMAGES_SUBDIR: &str = "images";

/// Configuration for one archiving run.
///
/// The catalog serves an invalid TLS certificate, so certificate validation
/// is off by default (`verify_tls: false`). Set `verify_tls` when targeting
/// a well-behaved mirror.
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    /// Origin all endpoint URLs are joined against.
    pub base_url: Url,
    /// Root output directory; texts and images land in subdirectories.
    pub output_dir: PathBuf,
    /// Worker pool width for the ID range (1 = fully sequential).
    pub concurrency: usize,
    /// Retry knobs for transient fetch failures.
    pub retry: RetryPolicy,
    /// HTTP connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// HTTP read timeout in seconds.
    pub read_timeout_secs: u64,
    /// Validate TLS certificates (off by default for the catalog's
    /// self-signed certificate).
    pub verify_tls: bool,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            output_dir: PathBuf::from("."),
            concurrency: 1,
            retry: RetryPolicy::default(),
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            read_timeout_secs: READ_TIMEOUT_SECS,
            verify_tls: false,
        }
    }
}

impl ArchiveConfig {
    /// Directory that receives book text files.
    #[must_use]
    pub fn books_dir(&self) -> PathBuf {
        self.output_dir.join(BOOKS_SUBDIR)
    }

    /// Directory that receives cover images.
    #[must_use]
    pub fn images_dir(&self) -> PathBuf {
        self.output_dir.join(IMAGES_SUBDIR)
    }

    /// URL of the catalog page for one book, shaped `{base}/b{id}/`.
    ///
    /// # Errors
    ///
    /// Returns `url::ParseError` if the base URL cannot absorb the segment
    /// (cannot-be-a-base URLs).
    pub fn book_page_url(&self, book_id: u32) -> Result<Url, url::ParseError> {
        self.base_url.join(&format!("b{book_id}/"))
    }

    /// URL of the raw-text endpoint, shaped `{base}/txt.php`; the book ID
    /// travels as the `id` query parameter.
    ///
    /// # Errors
    ///
    /// Returns `url::ParseError` if the base URL cannot absorb the segment.
    pub fn text_endpoint_url(&self) -> Result<Url, url::ParseError> {
        self.base_url.join("txt.php")
    }

    /// Returns a copy rooted at a different output directory.
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.output_dir = dir.as_ref().to_path_buf();
        self
    }
}

/// Parses the compiled-in default origin.
///
/// # Panics
///
/// Never in practice: the literal is a valid absolute URL.
#[must_use]
#[allow(clippy::expect_used)]
fn default_base_url() -> Url {
    Url::parse(DEFAULT_BASE_URL).expect("default base URL literal must parse")
}
