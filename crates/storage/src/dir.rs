//! Local dataset directory.
//!
//! Each dataset owns one directory holding its content files. The directory
//! is append-only with respect to installs: new content lands under a new
//! name, and transient artifacts (`.zip` downloads, `.part` extraction
//! output) never share a name with a content file.

use crate::error::{ErrorKind, Result};
use crate::path::{contain, sanitize_file_name};
use std::fs::create_dir_all as sync_create_dir;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tokio::fs;

/// Suffix for archives being downloaded.
pub const ARCHIVE_SUFFIX: &str = ".zip";
/// Suffix for extracted entries that have not been moved into place yet.
pub const PARTIAL_SUFFIX: &str = ".part";

/// Metadata for a content file in a dataset directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentFile {
    pub name: String,
    pub size: u64,
    pub modified: OffsetDateTime,
}

/// A dataset directory on the local filesystem.
///
/// Every name passed in is reduced to its basename and verified to resolve
/// inside the root before any filesystem call is made.
#[derive(Debug, Clone)]
pub struct DatasetDir {
    root: PathBuf,
}
impl DatasetDir {
    /// Opens (creating if necessary) the dataset directory at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidPath`](ErrorKind::InvalidPath) if the path is not
    /// absolute or exists but is not a directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::InvalidPath(root));
            }
        } else {
            // Non-async: happens once per dataset at startup.
            sync_create_dir(&root).map_err(|e| ErrorKind::from_io(e, &root))?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves an upstream-supplied name to an absolute path inside the
    /// directory.
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        let name = sanitize_file_name(name)?;
        contain(&self.root, &name)
    }

    /// Name of the temporary archive used while installing `name`.
    pub fn archive_path(&self, name: &str) -> Result<PathBuf> {
        let name = sanitize_file_name(name)?;
        contain(&self.root, &format!("{name}{ARCHIVE_SUFFIX}"))
    }

    /// Name of the temporary output used while extracting `name`.
    pub fn partial_path(&self, name: &str) -> Result<PathBuf> {
        let name = sanitize_file_name(name)?;
        contain(&self.root, &format!("{name}{PARTIAL_SUFFIX}"))
    }

    pub async fn exists(&self, name: &str) -> Result<bool> {
        let path = self.resolve(name)?;
        Ok(fs::try_exists(&path).await.map_err(ErrorKind::Io)?)
    }

    /// Lists content files, skipping transient artifacts and subdirectories.
    pub async fn list(&self) -> Result<Vec<ContentFile>> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => exn::bail!(ErrorKind::from_io(e, &self.root)),
        };
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| ErrorKind::from_io(e, &self.root))? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                tracing::debug!(path = %entry.path().display(), "Skipping non-UTF8 file name");
                continue;
            };
            if is_transient(&name) {
                continue;
            }
            let path = entry.path();
            let metadata = entry.metadata().await.map_err(|e| ErrorKind::from_io(e, &path))?;
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata.modified().map_err(ErrorKind::Io)?.into();
            files.push(ContentFile { name, size: metadata.len(), modified });
        }
        Ok(files)
    }

    /// The most recently modified content file, if any.
    ///
    /// Ties are broken by name so the choice is deterministic.
    pub async fn latest(&self) -> Result<Option<ContentFile>> {
        let files = self.list().await?;
        Ok(files.into_iter().max_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.name.cmp(&b.name))))
    }

    pub async fn remove(&self, name: &str) -> Result<()> {
        let path = self.resolve(name)?;
        Ok(fs::remove_file(&path).await.map_err(|e| ErrorKind::from_io(e, &path))?)
    }

    /// Removes an absolute path inside this directory, treating a missing
    /// file as success. Used on cleanup paths where the file may never have
    /// been created.
    pub async fn discard(&self, path: &Path) -> Result<()> {
        if path.parent() != Some(self.root.as_path()) {
            exn::bail!(ErrorKind::InvalidPath(path.to_path_buf()));
        }
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => exn::bail!(ErrorKind::from_io(e, path)),
        }
    }
}

fn is_transient(name: &str) -> bool {
    name.ends_with(ARCHIVE_SUFFIX) || name.ends_with(PARTIAL_SUFFIX)
}
