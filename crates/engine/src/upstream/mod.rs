//! The upstream content service.
//!
//! Only two calls: fetch the manifest, and stream a content package.

mod headers;
mod http;
#[cfg(test)]
pub(crate) mod memory;

pub use self::http::HttpUpstream;
pub(crate) use self::http::absolute_url;
use crate::error::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use kiosk_cache::Manifest;
use std::fmt::Debug;
use time::OffsetDateTime;

/// Body of a content package download, chunk by chunk.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>>>;

/// A manifest as returned by upstream, with its HTTP freshness headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedManifest {
    pub manifest: Manifest,
    /// From `Last-Modified`, or the fetch time when absent.
    pub last_modified: OffsetDateTime,
    /// From `Cache-Control: max-age`, zero when absent.
    pub max_age: u64,
}

#[async_trait]
pub trait Upstream: Debug + Send + Sync {
    /// Fetch the current manifest.
    async fn manifest(&self) -> Result<FetchedManifest>;

    /// Start downloading the package at `content_path` (relative to the
    /// content base).
    async fn archive(&self, content_path: &str) -> Result<ByteStream>;
}
