//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;
use url::Url;

use tululu_core::config::DEFAULT_BASE_URL;
use tululu_core::{DEFAULT_CONCURRENCY, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_SECS};

/// Archive books from the tululu.org free library.
///
/// Walks an inclusive range of numeric book IDs; for each existing book the
/// full text and cover image are stored under the output directory and the
/// book's metadata is printed to stdout.
#[derive(Parser, Debug)]
#[command(name = "tululu")]
#[command(author, version, about)]
pub struct Args {
    /// First book ID of the range (inclusive)
    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    pub start_id: u32,

    /// Last book ID of the range (inclusive)
    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    pub end_id: u32,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Directory that receives the book/ and images/ subdirectories
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Catalog origin to fetch from
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    pub base_url: Url,

    /// Maximum books processed concurrently (1-16)
    #[arg(short = 'c', long, default_value_t = DEFAULT_CONCURRENCY as u8, value_parser = clap::value_parser!(u8).range(1..=16))]
    pub concurrency: u8,

    /// Maximum retry attempts for transient failures (0-10)
    #[arg(short = 'r', long, default_value_t = DEFAULT_MAX_RETRIES as u8, value_parser = clap::value_parser!(u8).range(0..=10))]
    pub max_retries: u8,

    /// Delay between retry attempts in seconds
    #[arg(long, default_value_t = DEFAULT_RETRY_DELAY_SECS, value_parser = clap::value_parser!(u64).range(0..=3600))]
    pub retry_delay: u64,

    /// Validate TLS certificates (off by default; the catalog serves an
    /// invalid certificate)
    #[arg(long)]
    pub verify_tls: bool,
}
