//! Console sink for archived-book metadata.
//!
//! Each successfully archived book produces one self-contained block on
//! stdout: title, author, genre, then the comment list. Failures and skips
//! never print here; they go to the tracing log on stderr, which keeps
//! stdout clean enough to pipe.

use std::fmt::Write as _;
use std::io::Write as _;

use tracing::debug;

use crate::page::BookMetadata;

/// Prints per-book report blocks to stdout.
///
/// A block is rendered fully before a single locked write, so blocks from
/// parallel workers never interleave.
#[derive(Debug, Default)]
pub struct Reporter;

impl Reporter {
    /// Creates a stdout reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Prints the metadata block for one archived book.
    pub fn book(&self, metadata: &BookMetadata) {
        let block = render_book(metadata);
        let mut stdout = std::io::stdout().lock();
        if let Err(error) = stdout.write_all(block.as_bytes()) {
            debug!(error = %error, "stdout write failed");
        }
        if let Err(error) = stdout.flush() {
            debug!(error = %error, "stdout flush failed");
        }
    }
}

/// Renders one book's report block.
///
/// The comment header is printed even for books without comments, matching
/// the block layout readers of the catalog expect.
fn render_book(metadata: &BookMetadata) -> String {
    let mut block = String::new();
    let _ = writeln!(block, "Название: {}", metadata.title);
    let _ = writeln!(block, "Автор: {}", metadata.author);
    let _ = writeln!(block, "Жанр: {}", metadata.genre);
    let _ = writeln!(block, "Комментарии:");
    for comment in &metadata.comments {
        let _ = writeln!(block, "- {comment}");
    }
    block
}
