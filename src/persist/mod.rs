//! Streamed file persistence for book texts and cover images.
//!
//! Response bodies are streamed to disk through a fixed-size buffer, so
//! peak memory stays flat no matter how large a text is. Writes go to a
//! `.part` path first and are renamed into place only when the stream
//! completed, which keeps interrupted runs from leaving half a book behind
//! under the final name.

pub(crate) mod filename;

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use reqwest::Response;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Write buffer size. Bodies are flushed to disk in chunks of this size.
const STREAM_BUFFER_BYTES: usize = 8 * 1024;

/// What a stored file holds, for logging and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Plain-text book body.
    Text,
    /// Cover image.
    Image,
}

/// A file that made it to disk.
#[derive(Debug, Clone)]
pub struct StoredFile {
    /// Final path of the stored file.
    pub path: PathBuf,
    /// Body size in bytes.
    pub bytes_written: u64,
    /// What the file holds.
    pub kind: FileKind,
}

/// Errors that can occur while persisting a response body.
#[derive(Debug, Error)]
pub enum PersistError {
    /// File system error (create directory, create file, write, rename).
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The response body stream broke mid-transfer.
    #[error("stream interrupted reading {url}: {source}")]
    Stream {
        /// The URL whose body was being read.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// The run was cancelled while the body was being streamed.
    #[error("persistence cancelled")]
    Cancelled,
}

impl PersistError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a stream error.
    pub fn stream(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Stream {
            url: url.into(),
            source,
        }
    }
}

/// Streams a response body into `dir` under a sanitized version of
/// `filename_hint`.
///
/// The destination directory is created if needed. An existing file under
/// the final name is replaced, so re-running a range refreshes its files
/// instead of accumulating duplicates.
///
/// # Errors
///
/// Returns `PersistError` if:
/// - The directory or file cannot be created or written
/// - The body stream breaks mid-transfer
/// - The run is cancelled while streaming
#[instrument(skip(response, cancel), fields(url = %response.url(), dir = %dir.display()))]
pub async fn persist_response(
    response: Response,
    dir: &Path,
    filename_hint: &str,
    kind: FileKind,
    cancel: &CancellationToken,
) -> Result<StoredFile, PersistError> {
    let name = filename::sanitize_filename(filename_hint);

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| PersistError::io(dir, e))?;

    let final_path = dir.join(&name);
    let part_path = dir.join(format!("{name}.part"));
    debug!(path = %final_path.display(), "resolved output path");

    let file = File::create(&part_path)
        .await
        .map_err(|e| PersistError::io(part_path.clone(), e))?;

    let stream_result = stream_to_file(file, response, &part_path, cancel).await;

    let bytes_written = match stream_result {
        Ok(bytes_written) => bytes_written,
        Err(error) => {
            // Never leave a half-written file behind under any name.
            let _ = tokio::fs::remove_file(&part_path).await;
            return Err(error);
        }
    };

    replace_file(&part_path, &final_path).await?;

    // The destination directory may be relative to the working directory;
    // report the real location.
    let path = tokio::fs::canonicalize(&final_path)
        .await
        .unwrap_or(final_path);

    info!(path = %path.display(), bytes = bytes_written, ?kind, "file stored");

    Ok(StoredFile {
        path,
        bytes_written,
        kind,
    })
}

/// Streams the body into the file, returning bytes written.
///
/// Takes the file by value so it is closed before the caller renames the
/// path. Checks the cancellation token between chunks.
async fn stream_to_file(
    file: File,
    response: Response,
    part_path: &Path,
    cancel: &CancellationToken,
) -> Result<u64, PersistError> {
    let url = response.url().to_string();
    let mut writer = BufWriter::with_capacity(STREAM_BUFFER_BYTES, file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    loop {
        // Cancellation wins over a ready chunk so shutdown is prompt.
        let next_chunk = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(PersistError::Cancelled),
            chunk = stream.next() => chunk,
        };
        let Some(chunk_result) = next_chunk else {
            break;
        };
        let chunk = chunk_result.map_err(|e| PersistError::stream(&url, e))?;

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| PersistError::io(part_path, e))?;

        bytes_written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| PersistError::io(part_path, e))?;

    Ok(bytes_written)
}

/// Moves the completed `.part` file into place, replacing any previous run's
/// file under the final name.
async fn replace_file(part_path: &Path, final_path: &Path) -> Result<(), PersistError> {
    match tokio::fs::remove_file(final_path).await {
        Ok(()) => {}
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
        Err(error) => return Err(PersistError::io(final_path, error)),
    }
    tokio::fs::rename(part_path, final_path)
        .await
        .map_err(|e| PersistError::io(final_path, e))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use crate::test_support::socket_guard::start_mock_server_or_skip;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn fetch_body(server: &MockServer, route: &str) -> Response {
        reqwest::get(format!("{}{route}", server.uri())).await.unwrap()
    }

    #[tokio::test]
    async fn test_persist_streams_body_to_named_file() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        let temp_dir = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .and(path("/txt.php"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"book text body"))
            .mount(&mock_server)
            .await;

        let response = fetch_body(&mock_server, "/txt.php").await;
        let stored = persist_response(
            response,
            temp_dir.path(),
            "1.Книга.txt",
            FileKind::Text,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(stored.bytes_written, 14);
        assert_eq!(stored.kind, FileKind::Text);
        assert_eq!(std::fs::read(&stored.path).unwrap(), b"book text body");
        assert_eq!(
            stored.path.file_name().unwrap().to_str().unwrap(),
            "1.Книга.txt"
        );

        // No .part leftovers after success
        let names: Vec<String> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["1.Книга.txt".to_string()]);
    }

    #[tokio::test]
    async fn test_persist_creates_destination_directory() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("out").join("book");

        Mock::given(method("GET"))
            .and(path("/txt.php"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"x"))
            .mount(&mock_server)
            .await;

        let response = fetch_body(&mock_server, "/txt.php").await;
        let stored = persist_response(
            response,
            &nested,
            "5.txt",
            FileKind::Text,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(stored.path.exists());
        assert!(nested.is_dir());
    }

    #[tokio::test]
    async fn test_persist_overwrites_previous_run() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        let temp_dir = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .and(path("/first"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"old contents"))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/second"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"new"))
            .mount(&mock_server)
            .await;

        let cancel = CancellationToken::new();
        let response = fetch_body(&mock_server, "/first").await;
        persist_response(response, temp_dir.path(), "9.txt", FileKind::Text, &cancel)
            .await
            .unwrap();

        let response = fetch_body(&mock_server, "/second").await;
        let stored = persist_response(response, temp_dir.path(), "9.txt", FileKind::Text, &cancel)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&stored.path).unwrap(), b"new");
        let entries: Vec<_> = std::fs::read_dir(temp_dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1, "rerun must replace, not duplicate");
    }

    #[tokio::test]
    async fn test_persist_sanitizes_filename_hint() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        let temp_dir = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .and(path("/txt.php"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"data"))
            .mount(&mock_server)
            .await;

        let response = fetch_body(&mock_server, "/txt.php").await;
        let stored = persist_response(
            response,
            temp_dir.path(),
            "3.Кто виноват?.txt",
            FileKind::Text,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(
            stored.path.file_name().unwrap().to_str().unwrap(),
            "3.Кто виноват.txt"
        );
    }

    #[tokio::test]
    async fn test_persist_cancelled_leaves_no_files() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        let temp_dir = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .and(path("/txt.php"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"body"))
            .mount(&mock_server)
            .await;

        let response = fetch_body(&mock_server, "/txt.php").await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = persist_response(
            response,
            temp_dir.path(),
            "2.txt",
            FileKind::Text,
            &cancel,
        )
        .await;

        assert!(matches!(result, Err(PersistError::Cancelled)));
        let entries: Vec<_> = std::fs::read_dir(temp_dir.path()).unwrap().collect();
        assert!(
            entries.is_empty(),
            "no partial or final files may remain, found: {entries:?}"
        );
    }

    #[tokio::test]
    async fn test_persist_unwritable_directory_is_io_error() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        let temp_dir = TempDir::new().unwrap();

        // A file where the directory should go makes create_dir_all fail.
        let blocker = temp_dir.path().join("book");
        std::fs::write(&blocker, b"in the way").unwrap();

        Mock::given(method("GET"))
            .and(path("/txt.php"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"data"))
            .mount(&mock_server)
            .await;

        let response = fetch_body(&mock_server, "/txt.php").await;
        let result = persist_response(
            response,
            &blocker,
            "1.txt",
            FileKind::Text,
            &CancellationToken::new(),
        )
        .await;

        assert!(matches!(result, Err(PersistError::Io { .. })));
    }
}
