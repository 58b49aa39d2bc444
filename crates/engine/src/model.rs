use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use kiosk_cache::{Manifest, ManifestMeta};
use kiosk_storage::sanitize_file_name;
use time::OffsetDateTime;

/// One published content revision, resolved for a locale.
///
/// Descriptors are never mutated: a newer revision produces a new descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestDescriptor {
    pub version: String,
    /// Upstream path of the content package, relative to the content base URL.
    pub content_path: String,
    pub last_modified: OffsetDateTime,
    /// Seconds the descriptor may be reused for.
    pub max_age: u64,
}

impl ManifestDescriptor {
    pub fn from_manifest(manifest: &Manifest, locale: &str, meta: &ManifestMeta) -> Result<Self> {
        let content_path = manifest.content_path(locale).ok_or_raise(|| ErrorKind::MissingLocale(locale.to_string()))?;
        Ok(Self {
            version: manifest.version.clone(),
            content_path: content_path.to_string(),
            last_modified: meta.last_modified,
            max_age: meta.max_age,
        })
    }

    /// Local file name of the content: the basename of the content path.
    pub fn file_name(&self) -> Result<String> {
        sanitize_file_name(&self.content_path).or_raise(|| ErrorKind::UnsafePath(self.content_path.clone()))
    }
}

/// A manifest descriptor together with its freshness information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestResponse {
    pub manifest: ManifestDescriptor,
    pub meta: ManifestMeta,
}
