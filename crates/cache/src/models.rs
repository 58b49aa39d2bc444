//! Manifest payloads and cache entry types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::OffsetDateTime;

/// Manifest document as published by upstream.
///
/// Only the fields needed to locate a content package are kept. Upstream has
/// used both `contentPaths` and `mobileWorldContentPaths` for the locale map.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default)]
    pub version: String,
    #[serde(default, alias = "mobileWorldContentPaths")]
    pub content_paths: BTreeMap<String, String>,
}

impl Manifest {
    /// A manifest is worth caching only if it names a version and at least
    /// one content package.
    pub fn is_populated(&self) -> bool {
        !self.version.trim().is_empty() && self.content_paths.values().any(|path| !path.trim().is_empty())
    }

    pub fn content_path(&self, locale: &str) -> Option<&str> {
        self.content_paths.get(locale).map(String::as_str).filter(|path| !path.trim().is_empty())
    }
}

/// Freshness information accompanying a manifest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestMeta {
    #[serde(with = "time::serde::rfc3339")]
    pub last_modified: OffsetDateTime,
    /// Seconds the manifest may be reused for.
    pub max_age: u64,
    /// Set when the manifest was served from the cache rather than upstream.
    /// Never persisted.
    #[serde(default, skip_serializing)]
    pub was_cached: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestData {
    pub manifest: Manifest,
}

/// Stored representation of a manifest:
/// `{ "data": { "manifest": … }, "meta": { "lastModified": …, "maxAge": … } }`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedManifest {
    pub data: ManifestData,
    pub meta: ManifestMeta,
}

impl CachedManifest {
    pub fn new(manifest: Manifest, meta: ManifestMeta) -> Self {
        Self { data: ManifestData { manifest }, meta }
    }

    pub fn manifest(&self) -> &Manifest {
        &self.data.manifest
    }

    pub fn into_parts(self) -> (Manifest, ManifestMeta) {
        (self.data.manifest, self.meta)
    }
}

/// Input to [`VersionCache::set_manifest`](crate::VersionCache::set_manifest).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManifestUpdate {
    pub last_modified: OffsetDateTime,
    pub manifest: Manifest,
    pub max_age: u64,
}

/// How long a cache entry lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Expiry {
    /// A fixed number of seconds.
    Ttl(u64),
    /// Until the next daily content rotation.
    DailyReset,
}

/// A serialized value on its way to the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    pub payload: String,
    pub expiry: Expiry,
}

/// Result of a cache write.
///
/// Writes never fail the caller: an unreachable store is reported as
/// [`SetOutcome::Failed`] and logged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetOutcome {
    Stored { ttl: u64 },
    /// The entry would have expired immediately.
    Skipped,
    Failed,
}

impl SetOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, Self::Stored { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use time::macros::datetime;

    fn manifest(version: &str, paths: &[(&str, &str)]) -> Manifest {
        Manifest {
            version: version.to_string(),
            content_paths: paths.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }

    #[rstest]
    #[case(manifest("v1", &[("en", "/content/world_v1.content")]), true)]
    #[case(manifest("", &[("en", "/content/world_v1.content")]), false)]
    #[case(manifest("v1", &[]), false)]
    #[case(manifest("v1", &[("en", " ")]), false)]
    fn test_populated(#[case] manifest: Manifest, #[case] expected: bool) {
        assert_eq!(manifest.is_populated(), expected);
    }

    #[test]
    fn test_accepts_legacy_content_path_field() {
        let json = r#"{"version":"v2","mobileWorldContentPaths":{"en":"/c/world_v2.content"}}"#;
        let manifest: Manifest = serde_json::from_str(json).unwrap();
        assert_eq!(manifest.content_path("en"), Some("/c/world_v2.content"));
        assert_eq!(manifest.content_path("de"), None);
    }

    #[test]
    fn test_cached_manifest_wire_format() {
        let cached = CachedManifest::new(
            manifest("v1", &[("en", "/c/world_v1.content")]),
            ManifestMeta { last_modified: datetime!(2024-03-01 12:00 UTC), max_age: 300, was_cached: true },
        );
        let value = serde_json::to_value(&cached).unwrap();
        assert_eq!(value["data"]["manifest"]["version"], "v1");
        assert_eq!(value["data"]["manifest"]["contentPaths"]["en"], "/c/world_v1.content");
        assert_eq!(value["meta"]["maxAge"], 300);
        assert_eq!(value["meta"]["lastModified"], "2024-03-01T12:00:00Z");
        assert!(value["meta"].get("wasCached").is_none());

        let decoded: CachedManifest = serde_json::from_value(value).unwrap();
        assert!(!decoded.meta.was_cached);
        assert_eq!(decoded.manifest(), cached.manifest());
    }
}
