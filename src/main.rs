//! Main entry point for the zipdrop CLI application.
//!
//! Extracts a ZIP archive from the local filesystem or an HTTP URL into a
//! directory. Ctrl-C cancels the extraction cleanly.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use zipdrop::cli::matches_any;
use zipdrop::{Cli, EntryAction, ExtractOptions, Extractor, HttpRangeReader};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let extractor = Extractor::new(build_options(&cli));

    let cancel = extractor.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let target = Path::new(&cli.extract_dir);
    let summary = if cli.is_http_url() {
        let reader = Arc::new(
            HttpRangeReader::new(cli.file.clone())
                .await
                .with_context(|| format!("cannot open {}", cli.file))?,
        );
        let summary = extractor
            .extract_from(reader.clone(), &cli.file, target)
            .await?;

        if !cli.is_quiet() {
            eprintln!(
                "\nTotal bytes transferred: {}",
                format_size(reader.transferred_bytes())
            );
        }
        summary
    } else {
        extractor.extract(Path::new(&cli.file), target).await?
    };

    if !cli.is_very_quiet() {
        eprintln!(
            "{} files, {} directories, {} symlinks ({} skipped)",
            summary.files, summary.directories, summary.symlinks, summary.skipped
        );
    }

    Ok(())
}

/// Log level comes from `RUST_LOG`; without it only warnings are shown,
/// and `-qq` silences those too.
fn init_logging(cli: &Cli) {
    let default = if cli.is_very_quiet() { "error" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Translate CLI flags into extraction options.
///
/// Exclusions and progress output both go through the entry callback.
fn build_options(cli: &Cli) -> ExtractOptions {
    let quiet = cli.is_quiet();
    let exclude = cli.exclude.clone();

    ExtractOptions::default()
        .overwrite(cli.overwrite)
        .symlink_policy(cli.symlink_policy())
        .on_entry(move |event| {
            if matches_any(&exclude, &event.name) {
                return Ok(EntryAction::Skip);
            }
            if !quiet {
                println!("  extracting: {}", event.name);
            }
            Ok(EntryAction::Proceed)
        })
}

/// Format a byte size into a human-readable string.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(format_size(500), "500 bytes");
/// assert_eq!(format_size(1536), "1.50 KB");
/// assert_eq!(format_size(1048576), "1.00 MB");
/// ```
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
