use super::CacheStore;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-memory store for tests.
///
/// Expiry follows tokio's clock, so tests running with a paused clock can
/// `tokio::time::advance` past a TTL. [`MemoryStore::set_failing`] simulates an
/// unreachable store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
    failing: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent command fail with [`ErrorKind::Store`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of successful writes so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Store a raw value directly, bypassing serialization (for seeding
    /// corrupt entries in tests).
    pub async fn insert_raw(&self, key: impl Into<String>, value: impl Into<String>, ttl: u64) {
        let entry = Entry { value: value.into(), expires_at: Instant::now() + Duration::from_secs(ttl) };
        self.entries.write().await.insert(key.into(), entry);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            exn::bail!(ErrorKind::Store);
        }
        Ok(())
    }

    async fn live(&self, key: &str) -> Option<Entry> {
        let entries = self.entries.read().await;
        entries.get(key).filter(|entry| entry.expires_at > Instant::now()).cloned()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check()?;
        Ok(self.live(key).await.map(|entry| entry.value))
    }

    async fn set_ex(&self, key: &str, ttl: u64, value: &str) -> Result<()> {
        self.check()?;
        self.insert_raw(key, value, ttl).await;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>> {
        self.check()?;
        Ok(self.live(key).await.map(|entry| entry.expires_at.saturating_duration_since(Instant::now()).as_secs()))
    }
}
