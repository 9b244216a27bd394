//! ZIP archive reading.
//!
//! This module provides the archive-reading primitive the extraction engine
//! drives: a pull-based reader that yields entries one at a time and opens a
//! decompressed stream for the current entry.
//!
//! ## Architecture
//!
//! - `structures`: Data structures representing ZIP format elements (EOCD, file headers, etc.)
//! - `reader`: Central Directory walking and entry opening
//! - `stream`: Per-entry decompression and integrity checks
//!
//! ## Supported Features
//!
//! - Standard ZIP format (PKZIP APPNOTE 6.3.x compatible)
//! - ZIP64 extensions for files > 4GB
//! - STORED (no compression) method
//! - DEFLATE compression method
//!
//! ## Limitations
//!
//! - No encryption support
//! - No multi-disk archive support
//! - No BZIP2, LZMA, or other compression methods

mod reader;
mod stream;
mod structures;

#[cfg(test)]
pub(crate) mod testutil;

pub use reader::{ArchiveCloser, ArchiveReader};
pub use stream::EntryStream;
pub use structures::{CompressionMethod, RawEntry};
