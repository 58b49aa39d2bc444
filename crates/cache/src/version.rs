//! Version cache: remembers the latest manifest per dataset and daily vendor
//! offers, so upstream is not asked more often than it allows.

use crate::error::{ErrorKind, Result};
use crate::models::{CacheEntry, CachedManifest, Expiry, ManifestMeta, ManifestUpdate, SetOutcome};
use crate::reset::DailyReset;
use crate::store::CacheStore;
use exn::ResultExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, instrument, warn};

const MANIFEST: &str = "manifest";
const VENDOR: &str = "vendor";

/// Source of "now" for daily-reset expiry.
pub type Clock = fn() -> OffsetDateTime;

/// Typed access to manifests and vendor offers in a [`CacheStore`].
///
/// The store is an optimisation, never a dependency: reads against an
/// unreachable store are misses and writes report [`SetOutcome::Failed`].
/// Only malformed input (an empty key, an unpopulated manifest) is an error.
#[derive(Debug, Clone)]
pub struct VersionCache {
    store: Arc<dyn CacheStore>,
    namespace: String,
    reset: DailyReset,
    clock: Clock,
}

impl VersionCache {
    pub fn new(store: Arc<dyn CacheStore>, namespace: impl Into<String>) -> Self {
        Self { store, namespace: namespace.into(), reset: DailyReset::default(), clock: OffsetDateTime::now_utc }
    }

    pub fn with_reset(mut self, reset: DailyReset) -> Self {
        self.reset = reset;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Full store key for a manifest cached under `key`.
    pub fn manifest_key(&self, key: &str) -> Result<String> {
        self.key(MANIFEST, key)
    }

    fn key(&self, kind: &'static str, id: &str) -> Result<String> {
        let id = id.trim();
        if id.is_empty() {
            exn::bail!(ErrorKind::InvalidKey(kind));
        }
        Ok(match self.namespace.as_str() {
            "" => format!("{kind}:{id}"),
            namespace => format!("{namespace}:{kind}:{id}"),
        })
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn get_manifest(&self, key: &str) -> Result<Option<CachedManifest>> {
        let key = self.manifest_key(key)?;
        Ok(self.fetch(&key).await)
    }

    /// Cache a manifest for `max_age` seconds.
    #[instrument(level = "debug", skip(self, update), fields(version = %update.manifest.version))]
    pub async fn set_manifest(&self, key: &str, update: ManifestUpdate) -> Result<SetOutcome> {
        if !update.manifest.is_populated() {
            exn::bail!(ErrorKind::InvalidManifest);
        }
        let key = self.manifest_key(key)?;
        let meta = ManifestMeta { last_modified: update.last_modified, max_age: update.max_age, was_cached: false };
        let payload = serde_json::to_string(&CachedManifest::new(update.manifest, meta))
            .or_raise(|| ErrorKind::InvalidData)?;
        Ok(self.put(CacheEntry { key, payload, expiry: Expiry::Ttl(update.max_age) }).await)
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn get_vendor_offer(&self, id: &str) -> Result<Option<Value>> {
        let key = self.key(VENDOR, id)?;
        Ok(self.fetch(&key).await)
    }

    /// Cache a vendor offer until the next daily reset.
    #[instrument(level = "debug", skip(self, payload))]
    pub async fn set_vendor_offer(&self, id: &str, payload: &Value) -> Result<SetOutcome> {
        let key = self.key(VENDOR, id)?;
        let payload = serde_json::to_string(payload).or_raise(|| ErrorKind::InvalidData)?;
        Ok(self.put(CacheEntry { key, payload, expiry: Expiry::DailyReset }).await)
    }

    /// Remaining lifetime of a full store key (see [`VersionCache::manifest_key`]).
    pub async fn ttl(&self, key: &str) -> Result<Option<u64>> {
        self.store.ttl(key).await
    }

    async fn fetch<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get(key).await {
            Ok(raw) => raw?,
            Err(err) => {
                warn!(key, store = self.store.name(), error = ?err, "cache read failed, treating as a miss");
                return None;
            },
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(key, error = %err, "discarding undecodable cache entry");
                None
            },
        }
    }

    async fn put(&self, entry: CacheEntry) -> SetOutcome {
        let ttl = match entry.expiry {
            Expiry::Ttl(seconds) => seconds,
            Expiry::DailyReset => self.reset.seconds_until((self.clock)()),
        };
        if ttl == 0 {
            debug!(key = %entry.key, "entry would expire immediately, not caching");
            return SetOutcome::Skipped;
        }
        match self.store.set_ex(&entry.key, ttl, &entry.payload).await {
            Ok(()) => SetOutcome::Stored { ttl },
            Err(err) => {
                warn!(key = %entry.key, store = self.store.name(), error = ?err, "cache write failed");
                SetOutcome::Failed
            },
        }
    }
}
