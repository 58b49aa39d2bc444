//! Engine Error Types
//!
//! Every fallible engine operation reports one of the kinds below, with the
//! lower-level crate errors (storage, archive, pool, cache) attached as
//! children in the `exn` error tree.

use derive_more::{Display, Error};

/// An engine error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// ### Upstream
/// - [`ErrorKind::Upstream`]: upstream answered, but with a failure.
/// - [`ErrorKind::Transport`]: upstream could not be reached.
/// - [`ErrorKind::InvalidResponse`]: upstream answered with something unreadable.
/// - [`ErrorKind::MissingLocale`], [`ErrorKind::UnsafePath`]: the manifest
///   cannot be turned into a local file.
///
/// ### Local
/// - [`ErrorKind::Install`], [`ErrorKind::Storage`], [`ErrorKind::Worker`],
///   [`ErrorKind::InvalidRecord`], [`ErrorKind::Bootstrap`], [`ErrorKind::Cache`],
///   [`ErrorKind::UnknownCategory`]
/// - [`ErrorKind::NotReady`]: a lookup gave up waiting for its dataset.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("upstream error {code} ({status}): {message}")]
    Upstream { code: i64, status: String, message: String },
    #[display("upstream unreachable")]
    Transport,
    #[display("unreadable upstream response")]
    InvalidResponse,
    #[display("manifest has no content for locale {_0:?}")]
    MissingLocale(#[error(not(source))] String),
    /// An upstream-supplied path does not reduce to a usable file name.
    #[display("unsafe content path {_0:?}")]
    UnsafePath(#[error(not(source))] String),
    #[display("archive install failed")]
    Install,
    #[display("dataset storage error")]
    Storage,
    #[display("worker task failed")]
    Worker,
    #[display("undecodable {_0} record")]
    InvalidRecord(#[error(not(source))] &'static str),
    /// Loading a content file failed. `cause` describes the underlying
    /// error chain.
    #[display("bootstrap of {file} failed: {cause}")]
    Bootstrap { file: String, cause: String },
    #[display("unknown record category {_0:?}")]
    UnknownCategory(#[error(not(source))] String),
    #[display("version cache error")]
    Cache,
    #[display("dataset {_0} is not ready")]
    NotReady(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport | Self::NotReady(_) | Self::Worker => true,
            // 5xx-style upstream maintenance windows clear up on their own.
            Self::Upstream { status, .. } => status.starts_with('5') || status == "SystemDisabled",
            _ => false,
        }
    }
}

/// Messages of `err` and its first child at every level, outermost first.
pub fn describe(err: &Error) -> String {
    let mut messages = vec![err.frame().to_string()];
    let mut frame = err.frame();
    while let Some(child) = frame.children().first() {
        messages.push(child.to_string());
        frame = child;
    }
    messages.join(": ")
}
