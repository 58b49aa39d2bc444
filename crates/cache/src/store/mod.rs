//! Key-value stores backing the version cache.
//!
//! The [`VersionCache`](crate::VersionCache) only needs three commands from a
//! store: read a value, write a value with a lifetime, and ask for the
//! remaining lifetime of a key. Production uses [`SqliteStore`] (a local file)
//! or [`RedisStore`] (shared between processes); tests use [`MemoryStore`].

#[cfg(any(test, feature = "mock"))]
mod memory;
#[cfg(feature = "redis")]
mod redis;
#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(any(test, feature = "mock"))]
pub use self::memory::MemoryStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisStore;
#[cfg(feature = "sqlite")]
pub use self::sqlite::SqliteStore;
use crate::error::Result;
use async_trait::async_trait;
use std::fmt::Debug;

/// Minimal string key-value store with per-key expiry.
#[async_trait]
pub trait CacheStore: Debug + Send + Sync {
    /// Short identifier used in log fields.
    fn name(&self) -> &'static str;

    /// Get the live value stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value, expiring after
    /// `ttl` seconds.
    async fn set_ex(&self, key: &str, ttl: u64, value: &str) -> Result<()>;

    /// Remaining lifetime of `key` in seconds, `None` if the key is absent
    /// (or has no expiry).
    async fn ttl(&self, key: &str) -> Result<Option<u64>>;
}
