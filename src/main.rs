//! CLI entry point for the tululu archiver.

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tululu_core::{ArchiveConfig, Engine, RetryPolicy};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    // Logs go to stderr; stdout is reserved for the per-book report blocks.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");
    info!(
        start_id = args.start_id,
        end_id = args.end_id,
        base_url = %args.base_url,
        "tululu archiver starting"
    );

    let config = ArchiveConfig {
        base_url: args.base_url,
        output_dir: args.output_dir,
        concurrency: usize::from(args.concurrency),
        retry: RetryPolicy::new(
            u32::from(args.max_retries),
            Duration::from_secs(args.retry_delay),
        ),
        verify_tls: args.verify_tls,
        ..ArchiveConfig::default()
    };

    let engine = Engine::new(config)?;

    // First Ctrl-C flips the token; in-flight work unwinds through its
    // cancellation paths and partial files are cleaned up.
    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, shutting down");
            signal_token.cancel();
        }
    });

    // Per-book failures are absorbed into the stats; once the range was
    // attempted the process exits 0.
    let stats = engine.run(args.start_id, args.end_id, &cancel).await?;

    info!(
        archived = stats.archived(),
        missing = stats.missing(),
        failed = stats.failed(),
        retried = stats.retried(),
        interrupted = stats.was_interrupted(),
        total = stats.total(),
        "archive run complete"
    );

    Ok(())
}
