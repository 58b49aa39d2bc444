use super::{ByteStream, FetchedManifest, Upstream};
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

const CHUNK: usize = 512;

/// Upstream double serving canned manifests and packages.
#[derive(Debug, Default)]
pub(crate) struct MemoryUpstream {
    manifest: Mutex<Option<FetchedManifest>>,
    archives: Mutex<HashMap<String, Vec<u8>>>,
    fail_manifest: AtomicBool,
    truncate_downloads: AtomicBool,
    manifest_calls: AtomicUsize,
    archive_calls: AtomicUsize,
}

impl MemoryUpstream {
    pub(crate) fn set_manifest(&self, manifest: FetchedManifest) {
        *self.manifest.lock().unwrap() = Some(manifest);
    }

    pub(crate) fn put_archive(&self, content_path: &str, bytes: Vec<u8>) {
        self.archives.lock().unwrap().insert(content_path.to_string(), bytes);
    }

    pub(crate) fn fail_manifest(&self, fail: bool) {
        self.fail_manifest.store(fail, Ordering::SeqCst);
    }

    /// Downloads send their first chunk and then break off.
    pub(crate) fn truncate_downloads(&self, truncate: bool) {
        self.truncate_downloads.store(truncate, Ordering::SeqCst);
    }

    pub(crate) fn manifest_calls(&self) -> usize {
        self.manifest_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn archive_calls(&self) -> usize {
        self.archive_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Upstream for MemoryUpstream {
    async fn manifest(&self) -> Result<FetchedManifest> {
        self.manifest_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_manifest.load(Ordering::SeqCst) {
            exn::bail!(ErrorKind::Transport);
        }
        match self.manifest.lock().unwrap().clone() {
            Some(manifest) => Ok(manifest),
            None => exn::bail!(ErrorKind::InvalidResponse),
        }
    }

    async fn archive(&self, content_path: &str) -> Result<ByteStream> {
        self.archive_calls.fetch_add(1, Ordering::SeqCst);
        let Some(bytes) = self.archives.lock().unwrap().get(content_path).cloned() else {
            exn::bail!(ErrorKind::Upstream { code: 404, status: "404".into(), message: content_path.into() });
        };
        let mut chunks: Vec<Result<Vec<u8>>> = bytes.chunks(CHUNK).map(|chunk| Ok(chunk.to_vec())).collect();
        if self.truncate_downloads.load(Ordering::SeqCst) {
            chunks.truncate(1);
            chunks.push(Err(ErrorKind::Transport.into()));
        }
        Ok(futures::stream::iter(chunks).boxed())
    }
}
