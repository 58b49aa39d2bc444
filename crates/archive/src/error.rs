//! Archive Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};

/// An archive error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Data is corrupt or malformed. Don't retry with the same input.
    #[display("invalid or corrupted archive")]
    InvalidData,
    /// The payload is not a format we know how to unpack.
    #[display("unsupported archive format")]
    UnsupportedFormat,
    /// An entry name could not be reduced to a safe file name.
    #[display("invalid archive entry: {_0}")]
    InvalidEntry(#[error(not(source))] String),
    /// The archive unpacked cleanly but did not contain the expected content.
    #[display("archive does not contain {_0}")]
    MissingContent(#[error(not(source))] String),
    /// Reading the archive or writing extracted output failed.
    #[display("I/O error")]
    Io,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Io)
    }
}
