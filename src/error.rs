//! Error types for archive reading and extraction.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Error type an entry callback may return to abort an extraction.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for extraction operations.
pub type Result<T> = std::result::Result<T, ExtractError>;

/// Errors raised while reading the ZIP container itself.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid ZIP format: {0}")]
    InvalidFormat(&'static str),

    #[error("unsupported compression method: {0}")]
    UnsupportedCompression(u16),

    #[error("encrypted entries are not supported")]
    Encrypted,

    #[error("corrupt deflate stream: {0}")]
    Inflate(#[from] flate2::DecompressError),

    #[error("CRC-32 mismatch (expected {expected:#010x}, got {actual:#010x})")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("size mismatch (expected {expected} bytes, got {actual})")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("archive is closed")]
    Closed,
}

/// Terminal failure of an extraction.
///
/// `Canceled` always wins: once [`cancel`](crate::Extractor::cancel) has been
/// called, whatever error the interrupted I/O produced is replaced by it.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("extraction canceled")]
    Canceled,

    #[error("failed to open archive {archive}")]
    ArchiveOpen {
        archive: String,
        #[source]
        source: ArchiveError,
    },

    #[error("failed to read entry `{entry}`")]
    EntryRead {
        entry: String,
        #[source]
        source: ArchiveError,
    },

    #[error("filesystem error at {}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("entry callback failed for `{entry}`")]
    Callback {
        entry: String,
        #[source]
        source: BoxError,
    },

    #[error("entry `{entry}` escapes the target directory")]
    UnsafePath { entry: String },
}

impl ExtractError {
    pub fn is_canceled(&self) -> bool {
        matches!(self, ExtractError::Canceled)
    }

    pub(crate) fn fs(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ExtractError::Filesystem {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn entry_read(entry: &str, source: ArchiveError) -> Self {
        ExtractError::EntryRead {
            entry: entry.to_string(),
            source,
        }
    }
}
