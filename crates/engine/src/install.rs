//! Archive installer: download a content package and unpack it into a
//! dataset directory.
//!
//! The previously active content file is never touched. Transient files (the
//! downloaded `.zip`, extraction `.part` files) are removed on every path.

use crate::error::{ErrorKind, Result};
use crate::model::ManifestDescriptor;
use crate::upstream::Upstream;
use exn::ResultExt;
use futures::StreamExt;
use kiosk_archive::{ArchiveFormat, Unpacked};
use kiosk_storage::DatasetDir;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The content file was already on disk; nothing was downloaded.
    AlreadyPresent { file: String },
    Installed { file: String, format: ArchiveFormat, downloaded: u64, unpacked: u64 },
}

impl InstallOutcome {
    pub fn file(&self) -> &str {
        match self {
            Self::AlreadyPresent { file } | Self::Installed { file, .. } => file,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Installer {
    upstream: Arc<dyn Upstream>,
}

impl Installer {
    pub fn new(upstream: Arc<dyn Upstream>) -> Self {
        Self { upstream }
    }

    /// Make the content named by `manifest` available in `dir`.
    ///
    /// The target name is the basename of the upstream content path, verified
    /// to stay inside `dir` before anything is written.
    #[instrument(skip_all, fields(dir = %dir.root().display(), version = %manifest.version))]
    pub async fn install(&self, dir: &DatasetDir, manifest: &ManifestDescriptor) -> Result<InstallOutcome> {
        let file = manifest.file_name()?;
        if dir.exists(&file).await.or_raise(|| ErrorKind::Storage)? {
            debug!(file, "content already installed");
            return Ok(InstallOutcome::AlreadyPresent { file });
        }
        let archive = dir.archive_path(&file).or_raise(|| ErrorKind::UnsafePath(manifest.content_path.clone()))?;

        let result = self.fetch_and_unpack(dir, manifest, &file, &archive).await;
        if let Err(err) = dir.discard(&archive).await {
            warn!(path = %archive.display(), error = ?err, "could not remove downloaded archive");
        }
        let (downloaded, unpacked) = result?;
        info!(file, format = %unpacked.format, downloaded, unpacked = unpacked.bytes, "installed content");
        Ok(InstallOutcome::Installed { file, format: unpacked.format, downloaded, unpacked: unpacked.bytes })
    }

    async fn fetch_and_unpack(
        &self,
        dir: &DatasetDir,
        manifest: &ManifestDescriptor,
        file: &str,
        archive: &Path,
    ) -> Result<(u64, Unpacked)> {
        let downloaded = self.download(&manifest.content_path, archive).await?;
        debug!(bytes = downloaded, "download complete");
        let unpacked = unpack(dir.clone(), archive.to_path_buf(), file.to_string()).await?;
        Ok((downloaded, unpacked))
    }

    async fn download(&self, content_path: &str, archive: &Path) -> Result<u64> {
        let mut body = self.upstream.archive(content_path).await?;
        let file = File::create(archive).await.or_raise(|| ErrorKind::Storage)?;
        let mut out = BufWriter::new(file);
        let mut written = 0u64;
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            out.write_all(&chunk).await.or_raise(|| ErrorKind::Storage)?;
            written += chunk.len() as u64;
        }
        out.flush().await.or_raise(|| ErrorKind::Storage)?;
        out.get_ref().sync_all().await.or_raise(|| ErrorKind::Storage)?;
        Ok(written)
    }
}

/// Extraction is synchronous, so it runs on the blocking pool.
async fn unpack(dir: DatasetDir, archive: PathBuf, file: String) -> Result<Unpacked> {
    tokio::task::spawn_blocking(move || kiosk_archive::unpack(&archive, &dir, &file))
        .await
        .or_raise(|| ErrorKind::Install)?
        .or_raise(|| ErrorKind::Install)
}
