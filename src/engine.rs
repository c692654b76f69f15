//! Archiving engine: drives each book ID through fetch, availability
//! check, metadata extraction, and persistence.
//!
//! # Overview
//!
//! The engine walks an inclusive ID range, processing each ID in its own
//! tokio task under a semaphore that bounds concurrency. One ID's outcome
//! never affects another: a failed or missing book is logged and counted,
//! and the range moves on.
//!
//! # Example
//!
//! ```no_run
//! use tokio_util::sync::CancellationToken;
//! use tululu_core::{ArchiveConfig, Engine};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Engine::new(ArchiveConfig::default())?;
//! let stats = engine.run(1, 10, &CancellationToken::new()).await?;
//! println!("archived {}, missing {}", stats.archived(), stats.missing());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::ArchiveConfig;
use crate::fetch::{Availability, FetchError, FetchOptions, Fetcher};
use crate::page::{BookMetadata, ParseError, parse_book_page};
use crate::persist::{FileKind, PersistError, StoredFile, filename, persist_response};
use crate::report::Reporter;

/// Minimum allowed concurrency value.
const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
const MAX_CONCURRENCY: usize = 16;

/// Default concurrency: one book at a time, in ID order.
pub const DEFAULT_CONCURRENCY: usize = 1;

/// Error type for engine construction and range runs.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// The output directory could not be prepared.
    #[error("cannot prepare output directory {path}: {source}")]
    OutputDir {
        /// The directory that could not be created.
        path: std::path::PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Semaphore was closed unexpectedly.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}

/// Any error that can end one book's processing.
///
/// Absorbed at the worker boundary: logged with the book ID, counted, never
/// propagated past the book it belongs to.
#[derive(Debug, Error)]
pub enum BookError {
    /// A network fetch failed after retries.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The book page lacked a required structural element.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A file could not be written.
    #[error(transparent)]
    Persist(#[from] PersistError),
}

impl BookError {
    /// Returns true if this error is the cancellation signal, not a real
    /// failure.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Fetch(FetchError::Cancelled) | Self::Persist(PersistError::Cancelled)
        )
    }
}

/// Terminal state of one book ID.
#[derive(Debug)]
pub enum BookOutcome {
    /// Text (and cover, when the page had one that resolved) stored.
    Archived {
        /// Metadata extracted from the book page.
        metadata: BookMetadata,
        /// The stored text file.
        text: StoredFile,
        /// The stored cover image, if the page had one that resolved.
        image: Option<StoredFile>,
    },
    /// The catalog has no content under this ID (page or text endpoint
    /// redirected away).
    Missing,
    /// An unrecovered per-book error.
    Failed {
        /// What went wrong.
        error: BookError,
    },
    /// Shutdown was requested before this book completed.
    Cancelled,
}

/// Statistics from one range run.
///
/// Counters are atomic so concurrent workers can update them; accessors
/// take `&self`.
#[derive(Debug, Default)]
pub struct ArchiveStats {
    archived: AtomicUsize,
    missing: AtomicUsize,
    failed: AtomicUsize,
    retried: AtomicU64,
    interrupted: AtomicBool,
}

impl ArchiveStats {
    /// Creates a new stats tracker with zero counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of books fully archived (text stored, metadata reported).
    #[must_use]
    pub fn archived(&self) -> usize {
        self.archived.load(Ordering::SeqCst)
    }

    /// Number of IDs the catalog has no content for.
    #[must_use]
    pub fn missing(&self) -> usize {
        self.missing.load(Ordering::SeqCst)
    }

    /// Number of books that ended in an unrecovered error.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Total IDs that reached a terminal state (archived + missing + failed).
    #[must_use]
    pub fn total(&self) -> usize {
        self.archived() + self.missing() + self.failed()
    }

    /// Number of fetch retries performed during the run.
    #[must_use]
    pub fn retried(&self) -> u64 {
        self.retried.load(Ordering::SeqCst)
    }

    /// Returns true if the run was interrupted before the range finished.
    #[must_use]
    pub fn was_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    fn increment_archived(&self) {
        self.archived.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_missing(&self) {
        self.missing.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    fn record_retries(&self, count: u64) {
        self.retried.store(count, Ordering::SeqCst);
    }

    fn set_interrupted(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }
}

/// Archiving engine over an inclusive book-ID range.
///
/// # Concurrency Model
///
/// - Each book ID runs in its own tokio task
/// - A semaphore permit is acquired before dispatching each ID
/// - Permits are released automatically when tasks complete (RAII)
/// - Default width is 1, which reproduces strictly sequential processing
///
/// # Per-ID Isolation
///
/// Workers never share state. A worker's error is converted to a
/// [`BookOutcome`] at its boundary; a worker panic is caught at join and
/// counted as a failure. The range loop itself cannot be derailed by any
/// single ID.
#[derive(Debug, Clone)]
pub struct Engine {
    config: Arc<ArchiveConfig>,
    fetcher: Arc<Fetcher>,
    semaphore: Arc<Semaphore>,
    reporter: Arc<Reporter>,
}

impl Engine {
    /// Creates an engine and prepares the output directories.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if `config.concurrency`
    /// is outside 1–16, or [`EngineError::OutputDir`] if the output
    /// directories cannot be created.
    #[instrument(level = "debug", skip(config), fields(output_dir = %config.output_dir.display()))]
    pub fn new(config: ArchiveConfig) -> Result<Self, EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&config.concurrency) {
            return Err(EngineError::InvalidConcurrency {
                value: config.concurrency,
            });
        }

        for dir in [config.books_dir(), config.images_dir()] {
            std::fs::create_dir_all(&dir)
                .map_err(|source| EngineError::OutputDir { path: dir, source })?;
        }

        debug!(
            concurrency = config.concurrency,
            max_retries = config.retry.max_retries(),
            base_url = %config.base_url,
            "creating engine"
        );

        let fetcher = Arc::new(Fetcher::new(&config));
        let semaphore = Arc::new(Semaphore::new(config.concurrency));

        Ok(Self {
            config: Arc::new(config),
            fetcher,
            semaphore,
            reporter: Arc::new(Reporter::new()),
        })
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.config.concurrency
    }

    /// Archives every book in the inclusive ID range.
    ///
    /// An empty range (`start_id > end_id`) attempts nothing and returns
    /// zeroed stats. Individual book failures do NOT cause this method to
    /// error; they are logged and counted.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SemaphoreClosed`] if permit acquisition fails.
    #[instrument(skip(self, cancel))]
    pub async fn run(
        &self,
        start_id: u32,
        end_id: u32,
        cancel: &CancellationToken,
    ) -> Result<ArchiveStats, EngineError> {
        let stats = Arc::new(ArchiveStats::new());
        let retries_at_start = self.fetcher.retries_performed();

        if start_id > end_id {
            warn!(start_id, end_id, "empty ID range, nothing to do");
            return Ok(unwrap_stats(stats));
        }

        info!(start_id, end_id, "starting range");

        let mut handles: Vec<(u32, JoinHandle<()>)> = Vec::new();
        for book_id in start_id..=end_id {
            if cancel.is_cancelled() {
                stats.set_interrupted();
                break;
            }
            drain_finished_tasks(&mut handles, &stats).await;

            // Race permit acquisition against cancellation so Ctrl-C during
            // a full-concurrency wait breaks immediately.
            let permit = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                result = Arc::clone(&self.semaphore).acquire_owned() => {
                    Some(result.map_err(|_| EngineError::SemaphoreClosed)?)
                }
            };
            let Some(permit) = permit else {
                stats.set_interrupted();
                break;
            };

            let engine = self.clone();
            let stats = Arc::clone(&stats);
            let cancel = cancel.clone();
            handles.push((
                book_id,
                tokio::spawn(async move {
                    // Permit is dropped when this task exits (RAII)
                    let _permit = permit;
                    match engine.archive_book(book_id, &cancel).await {
                        BookOutcome::Archived { metadata, .. } => {
                            engine.reporter.book(&metadata);
                            stats.increment_archived();
                        }
                        BookOutcome::Missing => stats.increment_missing(),
                        BookOutcome::Failed { .. } => stats.increment_failed(),
                        BookOutcome::Cancelled => stats.set_interrupted(),
                    }
                }),
            ));
        }

        debug!(in_flight = handles.len(), "waiting for workers");
        for (book_id, handle) in handles {
            if let Err(join_error) = handle.await {
                error!(book_id, error = %join_error, "worker task panicked");
                stats.increment_failed();
            }
        }

        stats.record_retries(self.fetcher.retries_performed() - retries_at_start);

        info!(
            archived = stats.archived(),
            missing = stats.missing(),
            failed = stats.failed(),
            retried = stats.retried(),
            interrupted = stats.was_interrupted(),
            "range complete"
        );

        Ok(unwrap_stats(stats))
    }

    /// Processes one book ID to its terminal state.
    ///
    /// Never panics and never returns an error: every per-book condition is
    /// folded into the returned [`BookOutcome`].
    #[instrument(skip(self, cancel))]
    pub async fn archive_book(&self, book_id: u32, cancel: &CancellationToken) -> BookOutcome {
        match self.run_book(book_id, cancel).await {
            Ok(outcome) => outcome,
            Err(error) if error.is_cancelled() => {
                debug!(book_id, "book cancelled");
                BookOutcome::Cancelled
            }
            Err(error) => {
                error!(book_id, error = %error, "book failed");
                BookOutcome::Failed { error }
            }
        }
    }

    /// The happy-path state machine; errors bubble to [`Self::archive_book`].
    async fn run_book(
        &self,
        book_id: u32,
        cancel: &CancellationToken,
    ) -> Result<BookOutcome, BookError> {
        // Fetching + Checking: the catalog answers for unknown IDs with a
        // redirect to the front page instead of a 404.
        let page_url = self
            .config
            .book_page_url(book_id)
            .map_err(|_| FetchError::invalid_url(format!("b{book_id}/")))?;
        let page = self.fetcher.fetch(&page_url, cancel).await?;
        if let Availability::Absent { via } = page.availability() {
            info!(book_id, via = %via, "book not found");
            return Ok(BookOutcome::Missing);
        }

        // Extracting
        let body = page.text().await?;
        let metadata = parse_book_page(&body, &self.config.base_url)?;
        debug!(book_id, title = %metadata.title, "metadata extracted");

        // Persisting: the text endpoint performs its own absence redirect
        // independently of the page.
        let text_url = self
            .config
            .text_endpoint_url()
            .map_err(|_| FetchError::invalid_url("txt.php"))?;
        let options = FetchOptions::new().query("id", book_id.to_string());
        let text_fetch = self
            .fetcher
            .fetch_with_options(&text_url, options, cancel)
            .await?;
        if let Availability::Absent { via } = text_fetch.availability() {
            info!(book_id, via = %via, "no text for this book");
            return Ok(BookOutcome::Missing);
        }
        let text = persist_response(
            text_fetch.into_response(),
            &self.config.books_dir(),
            &filename::text_filename(book_id, &metadata.title),
            FileKind::Text,
            cancel,
        )
        .await?;

        let image = match &metadata.image_url {
            Some(image_url) => self.archive_cover(book_id, image_url, cancel).await?,
            None => {
                debug!(book_id, "page has no cover image");
                None
            }
        };

        Ok(BookOutcome::Archived {
            metadata,
            text,
            image,
        })
    }

    /// Fetches and stores the cover image.
    ///
    /// A redirect on the image URL means the cover is gone from the catalog;
    /// that is logged and the book completes with text only. Real fetch or
    /// write errors still fail the book.
    async fn archive_cover(
        &self,
        book_id: u32,
        image_url: &url::Url,
        cancel: &CancellationToken,
    ) -> Result<Option<StoredFile>, BookError> {
        let image_fetch = self.fetcher.fetch(image_url, cancel).await?;
        if let Availability::Absent { via } = image_fetch.availability() {
            warn!(book_id, url = %image_url, via = %via, "cover image gone, archiving text only");
            return Ok(None);
        }
        let stored = persist_response(
            image_fetch.into_response(),
            &self.config.images_dir(),
            &filename::image_filename(image_url, book_id),
            FileKind::Image,
            cancel,
        )
        .await?;
        Ok(Some(stored))
    }
}

/// Reaps already-finished worker tasks so the handle list stays small on
/// long ranges. Join errors (panics) are counted as failures.
async fn drain_finished_tasks(handles: &mut Vec<(u32, JoinHandle<()>)>, stats: &ArchiveStats) {
    let mut idx = 0;
    while idx < handles.len() {
        if handles[idx].1.is_finished() {
            let (book_id, handle) = handles.swap_remove(idx);
            if let Err(join_error) = handle.await {
                error!(book_id, error = %join_error, "worker task panicked");
                stats.increment_failed();
            }
        } else {
            idx += 1;
        }
    }
}

/// Recovers owned stats from the shared handle once all workers are done.
fn unwrap_stats(stats: Arc<ArchiveStats>) -> ArchiveStats {
    match Arc::try_unwrap(stats) {
        Ok(stats) => stats,
        Err(shared) => {
            // All tasks were joined, so this branch should be unreachable;
            // rebuild from the atomic values rather than panic.
            let stats = ArchiveStats::new();
            stats.archived.store(shared.archived(), Ordering::SeqCst);
            stats.missing.store(shared.missing(), Ordering::SeqCst);
            stats.failed.store(shared.failed(), Ordering::SeqCst);
            stats.record_retries(shared.retried());
            if shared.was_interrupted() {
                stats.set_interrupted();
            }
            stats
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    fn config_with_concurrency(concurrency: usize, dir: &std::path::Path) -> ArchiveConfig {
        ArchiveConfig {
            concurrency,
            ..ArchiveConfig::default().with_output_dir(dir)
        }
    }

    #[test]
    fn test_engine_new_valid_concurrency() {
        let temp_dir = tempfile::TempDir::new().unwrap();

        let engine = Engine::new(config_with_concurrency(1, temp_dir.path())).unwrap();
        assert_eq!(engine.concurrency(), 1);

        let engine = Engine::new(config_with_concurrency(16, temp_dir.path())).unwrap();
        assert_eq!(engine.concurrency(), 16);
    }

    #[test]
    fn test_engine_new_invalid_concurrency_zero() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let result = Engine::new(config_with_concurrency(0, temp_dir.path()));
        assert!(matches!(
            result,
            Err(EngineError::InvalidConcurrency { value: 0 })
        ));
    }

    #[test]
    fn test_engine_new_invalid_concurrency_too_high() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let result = Engine::new(config_with_concurrency(17, temp_dir.path()));
        assert!(matches!(
            result,
            Err(EngineError::InvalidConcurrency { value: 17 })
        ));
    }

    #[test]
    fn test_engine_new_creates_output_directories() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config = ArchiveConfig::default().with_output_dir(temp_dir.path());
        Engine::new(config).unwrap();

        assert!(temp_dir.path().join("book").is_dir());
        assert!(temp_dir.path().join("images").is_dir());
    }

    #[test]
    fn test_engine_new_unusable_output_dir_fails() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let blocker = temp_dir.path().join("occupied");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let result = Engine::new(ArchiveConfig::default().with_output_dir(&blocker));
        assert!(matches!(result, Err(EngineError::OutputDir { .. })));
    }

    #[test]
    fn test_archive_stats_default() {
        let stats = ArchiveStats::default();
        assert_eq!(stats.archived(), 0);
        assert_eq!(stats.missing(), 0);
        assert_eq!(stats.failed(), 0);
        assert_eq!(stats.retried(), 0);
        assert_eq!(stats.total(), 0);
        assert!(!stats.was_interrupted());
    }

    #[test]
    fn test_archive_stats_increment() {
        let stats = ArchiveStats::new();

        stats.increment_archived();
        stats.increment_archived();
        stats.increment_missing();
        stats.increment_failed();
        stats.record_retries(4);

        assert_eq!(stats.archived(), 2);
        assert_eq!(stats.missing(), 1);
        assert_eq!(stats.failed(), 1);
        assert_eq!(stats.retried(), 4);
        assert_eq!(stats.total(), 4);
    }

    #[test]
    fn test_archive_stats_thread_safe() {
        use std::thread;

        let stats = Arc::new(ArchiveStats::new());
        let mut threads = Vec::new();

        for _ in 0..10 {
            let stats = Arc::clone(&stats);
            threads.push(thread::spawn(move || {
                for _ in 0..100 {
                    stats.increment_archived();
                    stats.increment_missing();
                    stats.increment_failed();
                }
            }));
        }
        for thread in threads {
            thread.join().unwrap();
        }

        assert_eq!(stats.archived(), 1000);
        assert_eq!(stats.missing(), 1000);
        assert_eq!(stats.failed(), 1000);
        assert_eq!(stats.total(), 3000);
    }

    #[test]
    fn test_engine_error_display() {
        let error = EngineError::InvalidConcurrency { value: 0 };
        let msg = error.to_string();
        assert!(msg.contains("invalid concurrency"));
        assert!(msg.contains('0'));
        assert!(msg.contains("16"));
    }

    #[test]
    fn test_book_error_cancellation_detection() {
        assert!(BookError::from(FetchError::Cancelled).is_cancelled());
        assert!(BookError::from(PersistError::Cancelled).is_cancelled());
        assert!(!BookError::from(FetchError::http_status("https://tululu.org/b1/", 404)).is_cancelled());
    }

    #[tokio::test]
    async fn test_run_empty_range_attempts_nothing() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let engine = Engine::new(ArchiveConfig::default().with_output_dir(temp_dir.path())).unwrap();

        let stats = tokio_test::assert_ok!(engine.run(10, 9, &CancellationToken::new()).await);
        assert_eq!(stats.total(), 0);
        assert!(!stats.was_interrupted());
    }

    #[tokio::test]
    async fn test_run_cancelled_before_start_dispatches_nothing() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let engine = Engine::new(ArchiveConfig::default().with_output_dir(temp_dir.path())).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let stats = tokio_test::assert_ok!(engine.run(1, 100, &cancel).await);
        assert_eq!(stats.total(), 0);
        assert!(stats.was_interrupted());
    }
}
