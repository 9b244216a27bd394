//! # zipdrop
//!
//! A cancellable, streaming ZIP extraction engine.
//!
//! This library extracts ZIP archives to disk one entry at a time, recreating
//! directories, POSIX permissions and symbolic links. Extraction can be
//! intercepted per entry and cancelled at any point from another task.
//!
//! ## Features
//!
//! - Sequential, pull-based reading: only one entry stream is open at a time
//! - Extract from local files or from HTTP/HTTPS URLs using Range requests
//! - Support for ZIP64 format (archives larger than 4GB)
//! - Support for STORED (uncompressed) and DEFLATE compression methods
//! - CRC-32 and size verification of every extracted entry
//! - Entry names always decoded as UTF-8
//! - Configurable symlink handling for platforms without unprivileged symlinks
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use zipdrop::{ExtractOptions, Extractor};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let extractor = Extractor::new(ExtractOptions::default());
//!     let cancel = extractor.cancel_handle();
//!
//!     tokio::spawn(async move {
//!         tokio::signal::ctrl_c().await.ok();
//!         cancel.cancel();
//!     });
//!
//!     let summary = extractor
//!         .extract(Path::new("archive.zip"), Path::new("out"))
//!         .await?;
//!     println!("extracted {} files", summary.files);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod error;
pub mod extract;
pub mod fs;
pub mod io;
pub mod zip;

pub use cli::Cli;
pub use error::{ArchiveError, BoxError, ExtractError};
pub use extract::{
    CancelHandle, EntryAction, EntryEvent, ExtractOptions, ExtractSummary, Extractor, SymlinkPolicy,
};
pub use io::{HttpRangeReader, LocalFileReader, ReadAt};
pub use zip::{ArchiveReader, EntryStream, RawEntry};
