//! Library-wide error and result types.

use std::io;

use thiserror::Error;

/// Result alias used throughout nisarc.
pub type Result<T> = std::result::Result<T, Error>;

/// All errors the library can produce.
///
/// Every error is terminal for the operation that raised it; parsers never
/// hand back a partially built container.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad magic, an unsupported flag value or an inconsistent count.
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// A computed read or write range falls outside its buffer.
    #[error("out of bounds: {len} bytes at {offset:#x} exceeds limit {limit:#x}")]
    OutOfBounds { offset: u64, len: u64, limit: u64 },

    /// A directory-derived total disagrees with another table.
    #[error("size mismatch in {what}: expected {expected}, found {found}")]
    SizeMismatch {
        what: String,
        expected: u64,
        found: u64,
    },

    /// A name lookup missed.
    #[error("not found: {0:?}")]
    NotFound(String),

    /// The data uses a feature this library deliberately does not handle.
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// An underlying I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The zstd decoder rejected a reconstructed frame.
    #[cfg(feature = "compression")]
    #[error("zstd decompression failed: {0}")]
    Zstd(#[source] io::Error),
}

impl Error {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Error::MalformedHeader(msg.into())
    }

    pub(crate) fn out_of_bounds(offset: usize, len: usize, limit: usize) -> Self {
        Error::OutOfBounds {
            offset: offset as u64,
            len: len as u64,
            limit: limit as u64,
        }
    }

    pub(crate) fn size_mismatch(what: impl Into<String>, expected: u64, found: u64) -> Self {
        Error::SizeMismatch {
            what: what.into(),
            expected,
            found,
        }
    }

    pub(crate) fn unsupported(msg: impl Into<String>) -> Self {
        Error::UnsupportedFeature(msg.into())
    }
}
