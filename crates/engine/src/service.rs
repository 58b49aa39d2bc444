use crate::error::{ErrorKind, Result};
use crate::model::{ManifestDescriptor, ManifestResponse};
use crate::upstream::Upstream;
use exn::ResultExt;
use kiosk_cache::{ManifestMeta, ManifestUpdate, SetOutcome, VersionCache};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Resolves the current manifest of one dataset, preferring the version cache.
#[derive(Debug, Clone)]
pub struct ManifestService {
    upstream: Arc<dyn Upstream>,
    cache: VersionCache,
    key: String,
    locale: String,
}

impl ManifestService {
    /// `key` names the dataset's manifest in the cache.
    pub fn new(
        upstream: Arc<dyn Upstream>,
        cache: VersionCache,
        key: impl Into<String>,
        locale: impl Into<String>,
    ) -> Self {
        Self { upstream, cache, key: key.into(), locale: locale.into() }
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    /// The current manifest for this service's locale.
    ///
    /// Served from the cache unless `skip_cache` is set or nothing is cached;
    /// otherwise fetched from upstream and written back. A cache that cannot
    /// be read or written only costs an extra upstream request.
    #[instrument(skip(self), fields(key = %self.key, locale = %self.locale))]
    pub async fn get_manifest(&self, skip_cache: bool) -> Result<ManifestResponse> {
        if !skip_cache && let Some(cached) = self.cache.get_manifest(&self.key).await.or_raise(|| ErrorKind::Cache)? {
            let (manifest, mut meta) = cached.into_parts();
            meta.was_cached = true;
            debug!(version = %manifest.version, "manifest served from cache");
            let descriptor = ManifestDescriptor::from_manifest(&manifest, &self.locale, &meta)?;
            return Ok(ManifestResponse { manifest: descriptor, meta });
        }

        let fetched = self.upstream.manifest().await?;
        let meta = ManifestMeta { last_modified: fetched.last_modified, max_age: fetched.max_age, was_cached: false };
        let descriptor = ManifestDescriptor::from_manifest(&fetched.manifest, &self.locale, &meta)?;
        info!(version = %descriptor.version, content_path = %descriptor.content_path, max_age = meta.max_age, "fetched manifest");

        let update = ManifestUpdate {
            last_modified: fetched.last_modified,
            manifest: fetched.manifest,
            max_age: fetched.max_age,
        };
        match self.cache.set_manifest(&self.key, update).await.or_raise(|| ErrorKind::Cache)? {
            SetOutcome::Stored { ttl } => debug!(ttl, "manifest cached"),
            outcome => debug!(?outcome, "manifest not cached"),
        }
        Ok(ManifestResponse { manifest: descriptor, meta })
    }
}
