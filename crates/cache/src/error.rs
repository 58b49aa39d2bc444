//! Cache Error Types
//!
//! Store connectivity problems are reported to callers of the
//! [`VersionCache`](crate::VersionCache) as soft failures (a miss, or
//! [`SetOutcome::Failed`](crate::SetOutcome::Failed)); the kinds below only
//! escape for programming errors and direct store access.

use derive_more::{Display, Error};

/// A cache error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("database error")]
    Database,
    #[display("database migration error")]
    Migration,
    /// The external store could not be reached or rejected the command.
    #[display("cache store unavailable")]
    Store,
    /// Serialization/deserialization error.
    #[display("invalid cache data")]
    InvalidData,
    #[display("invalid {_0} cache key")]
    InvalidKey(#[error(not(source))] &'static str),
    /// Refusing to cache a manifest without a version or content paths.
    #[display("manifest is not populated")]
    InvalidManifest,
    #[display("daily reset hour out of range: {_0}")]
    InvalidResetHour(#[error(not(source))] u8),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database | Self::Store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_are_retryable() {
        assert!(ErrorKind::Store.is_retryable());
        assert!(ErrorKind::Database.is_retryable());
        assert!(!ErrorKind::InvalidManifest.is_retryable());
        assert!(!ErrorKind::InvalidKey("manifest").is_retryable());
    }

    #[test]
    fn test_display_names_the_key_kind() {
        assert_eq!(ErrorKind::InvalidKey("vendor").to_string(), "invalid vendor cache key");
    }
}
