use derive_more::{Display, Error};
use std::path::PathBuf;

/// A worker pool error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for worker pool operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The pool has been closed and accepts no new work.
    #[display("worker pool is closed")]
    Closed,
    /// The dataset file is missing or is not a readable database.
    #[display("cannot open dataset: {}", _0.display())]
    Open(#[error(not(source))] PathBuf),
    #[display("query failed: {_0}")]
    Query(#[error(not(source))] String),
    /// A row did not have a decodable `json` column.
    #[display("undecodable row")]
    Decode,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // A dataset can be missing while an install is still renaming it into place.
        matches!(self, Self::Open(_))
    }
}
