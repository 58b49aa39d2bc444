//! Entry-by-entry extraction into a dataset directory.

use crate::ArchiveFormat;
use crate::error::{ErrorKind, Result};
use bzip2::read::MultiBzDecoder;
use exn::ResultExt;
use flate2::read::MultiGzDecoder;
use kiosk_storage::{DatasetDir, sanitize_file_name};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read};
use std::path::{Path, PathBuf};
use tracing::instrument;
use zip::ZipArchive;

/// Outcome of a successful [`unpack`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unpacked {
    pub format: ArchiveFormat,
    /// Absolute path of the content file inside the dataset directory.
    pub content: PathBuf,
    /// Every file written by this call.
    pub files: Vec<PathBuf>,
    /// Decompressed bytes written.
    pub bytes: u64,
}

/// Unpacks the archive at `source` into `dest`, producing `content_name`.
///
/// Entries are streamed one at a time; the archive is never held in memory.
/// Only the content is written: to a `.part` file that is renamed into place
/// once complete. A single-file archive is always stored as `content_name`;
/// a multi-file archive must contain an entry whose basename is
/// `content_name`, and its other entries are skipped so nothing but content
/// ever lands in the dataset directory.
///
/// On any error every file written by this call is removed again.
///
/// Blocking: call from [`spawn_blocking`](https://docs.rs/tokio/latest/tokio/task/fn.spawn_blocking.html)
/// in async contexts.
#[instrument(skip(dest), fields(dir = %dest.root().display()))]
pub fn unpack(source: &Path, dest: &DatasetDir, content_name: &str) -> Result<Unpacked> {
    let format = ArchiveFormat::detect(source)?;
    let content_name = sanitize_file_name(content_name).or_raise(|| ErrorKind::InvalidEntry(content_name.to_string()))?;
    let content = dest.resolve(&content_name).or_raise(|| ErrorKind::InvalidEntry(content_name.clone()))?;
    let mut files = Vec::new();
    let result = match format {
        ArchiveFormat::Zip => unpack_zip(source, dest, &content_name, &mut files),
        ArchiveFormat::Gzip => {
            let reader = MultiGzDecoder::new(open(source)?);
            write_entry(dest, &content_name, reader, &mut files)
        },
        ArchiveFormat::Bzip2 => {
            let reader = MultiBzDecoder::new(open(source)?);
            write_entry(dest, &content_name, reader, &mut files)
        },
        ArchiveFormat::Raw => write_entry(dest, &content_name, open(source)?, &mut files),
    };
    let bytes = match result {
        Ok(bytes) if files.contains(&content) => bytes,
        Ok(_) => {
            remove_all(&files);
            exn::bail!(ErrorKind::MissingContent(content_name));
        },
        Err(e) => {
            remove_all(&files);
            return Err(e);
        },
    };
    tracing::debug!(%format, bytes, files = files.len(), "Unpacked archive");
    Ok(Unpacked { format, content, files, bytes })
}

fn open(source: &Path) -> Result<BufReader<File>> {
    Ok(BufReader::new(File::open(source).or_raise(|| ErrorKind::Io)?))
}

fn unpack_zip(source: &Path, dest: &DatasetDir, content_name: &str, files: &mut Vec<PathBuf>) -> Result<u64> {
    let mut archive = ZipArchive::new(open(source)?).or_raise(|| ErrorKind::InvalidData)?;
    let single = archive.file_names().filter(|name| !name.ends_with('/')).count() == 1;
    for index in 0..archive.len() {
        let entry = archive.by_index(index).or_raise(|| ErrorKind::InvalidData)?;
        if entry.is_dir() {
            continue;
        }
        if !single {
            match sanitize_file_name(entry.name()) {
                Ok(name) if name == content_name => {},
                _ => {
                    tracing::debug!(entry = %entry.name(), "Skipping archive entry other than the content");
                    continue;
                },
            }
        }
        return write_entry(dest, content_name, entry, files);
    }
    Ok(0)
}

/// Streams `reader` into `<name>.part`, then renames it to `name`.
fn write_entry(dest: &DatasetDir, name: &str, mut reader: impl Read, files: &mut Vec<PathBuf>) -> Result<u64> {
    let partial = dest.partial_path(name).or_raise(|| ErrorKind::InvalidEntry(name.to_string()))?;
    let target = dest.resolve(name).or_raise(|| ErrorKind::InvalidEntry(name.to_string()))?;
    let written = (|| -> Result<u64> {
        let mut writer = BufWriter::new(File::create(&partial).or_raise(|| ErrorKind::Io)?);
        let written = match io::copy(&mut reader, &mut writer) {
            Ok(written) => written,
            Err(e) => {
                let kind = classify(&e);
                return Err(e).or_raise(|| kind);
            },
        };
        let file = writer.into_inner().map_err(|e| e.into_error()).or_raise(|| ErrorKind::Io)?;
        file.sync_all().or_raise(|| ErrorKind::Io)?;
        fs::rename(&partial, &target).or_raise(|| ErrorKind::Io)?;
        Ok(written)
    })();
    match written {
        Ok(written) => {
            files.push(target);
            Ok(written)
        },
        Err(e) => {
            _ = fs::remove_file(&partial);
            Err(e)
        },
    }
}

// Anything but a write-side failure means the decoder rejected its input.
fn classify(e: &io::Error) -> ErrorKind {
    match e.kind() {
        io::ErrorKind::WriteZero
        | io::ErrorKind::StorageFull
        | io::ErrorKind::PermissionDenied
        | io::ErrorKind::ReadOnlyFilesystem => ErrorKind::Io,
        _ => ErrorKind::InvalidData,
    }
}

fn remove_all(files: &[PathBuf]) {
    for file in files {
        if let Err(e) = fs::remove_file(file) {
            tracing::warn!(path = %file.display(), error = %e, "Could not remove extracted file during cleanup");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression as GzLevel;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::{CompressionMethod, ZipWriter};

    const SQLITE_HEADER: &[u8] = b"SQLite format 3\0rest-of-database";

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let mut zip = ZipWriter::new(File::create(path).unwrap());
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, data) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    fn leftovers(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_single_entry_zip_is_stored_under_content_name() {
        let scratch = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        let dest = DatasetDir::new(data.path()).unwrap();
        let source = scratch.path().join("download.zip");
        write_zip(&source, &[("some/dir/other-name.content", SQLITE_HEADER)]);

        let unpacked = unpack(&source, &dest, "/remote/world.content").unwrap();
        assert_eq!(unpacked.format, ArchiveFormat::Zip);
        assert_eq!(unpacked.content, data.path().join("world.content"));
        assert_eq!(unpacked.bytes, SQLITE_HEADER.len() as u64);
        assert_eq!(fs::read(&unpacked.content).unwrap(), SQLITE_HEADER);
        assert_eq!(leftovers(data.path()), vec!["world.content"]);
    }

    #[test]
    fn test_multi_entry_zip_only_extracts_content() {
        let scratch = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        let dest = DatasetDir::new(data.path()).unwrap();
        let source = scratch.path().join("download.zip");
        write_zip(&source, &[
            ("../../escape.txt", b"readme"),
            ("nested/world.content", SQLITE_HEADER),
            ("zz_readme.txt", b"notes"),
        ]);

        let unpacked = unpack(&source, &dest, "world.content").unwrap();
        assert_eq!(unpacked.files, vec![data.path().join("world.content")]);
        assert_eq!(unpacked.bytes, SQLITE_HEADER.len() as u64);
        assert!(!scratch.path().join("escape.txt").exists());
        assert_eq!(leftovers(data.path()), vec!["world.content"]);
    }

    #[test]
    fn test_multi_entry_zip_without_content_is_rolled_back() {
        let scratch = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        let dest = DatasetDir::new(data.path()).unwrap();
        let source = scratch.path().join("download.zip");
        write_zip(&source, &[("a.txt", b"a"), ("b.txt", b"b")]);

        let err = unpack(&source, &dest, "world.content").unwrap_err();
        assert_eq!(*err, ErrorKind::MissingContent("world.content".to_string()));
        assert!(leftovers(data.path()).is_empty());
    }

    #[test]
    fn test_existing_files_are_not_replaced() {
        let scratch = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        fs::write(data.path().join("active.content"), b"active").unwrap();
        let dest = DatasetDir::new(data.path()).unwrap();
        let source = scratch.path().join("download.zip");
        write_zip(&source, &[("active.content", b"replacement"), ("world.content", SQLITE_HEADER)]);

        unpack(&source, &dest, "world.content").unwrap();
        assert_eq!(fs::read(data.path().join("active.content")).unwrap(), b"active");
    }

    #[test]
    fn test_truncated_zip_is_rejected() {
        let scratch = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        let dest = DatasetDir::new(data.path()).unwrap();
        let source = scratch.path().join("download.zip");
        write_zip(&source, &[("world.content", &[7u8; 4096])]);
        let bytes = fs::read(&source).unwrap();
        fs::write(&source, &bytes[..bytes.len() / 2]).unwrap();

        let err = unpack(&source, &dest, "world.content").unwrap_err();
        assert_eq!(*err, ErrorKind::InvalidData);
        assert!(leftovers(data.path()).is_empty());
    }

    #[test]
    fn test_gzip_payload() {
        let scratch = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        let dest = DatasetDir::new(data.path()).unwrap();
        let source = scratch.path().join("download.zip");
        let mut encoder = GzEncoder::new(Vec::new(), GzLevel::default());
        encoder.write_all(SQLITE_HEADER).unwrap();
        fs::write(&source, encoder.finish().unwrap()).unwrap();

        let unpacked = unpack(&source, &dest, "world.content").unwrap();
        assert_eq!(unpacked.format, ArchiveFormat::Gzip);
        assert_eq!(fs::read(unpacked.content).unwrap(), SQLITE_HEADER);
    }

    #[test]
    fn test_raw_sqlite_payload() {
        let scratch = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        let dest = DatasetDir::new(data.path()).unwrap();
        let source = scratch.path().join("download.zip");
        fs::write(&source, SQLITE_HEADER).unwrap();

        let unpacked = unpack(&source, &dest, "world.content").unwrap();
        assert_eq!(unpacked.format, ArchiveFormat::Raw);
        assert_eq!(unpacked.files, vec![data.path().join("world.content")]);
    }

    #[test]
    fn test_unsupported_payload() {
        let scratch = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        let dest = DatasetDir::new(data.path()).unwrap();
        let source = scratch.path().join("download.zip");
        fs::write(&source, b"<html>Service Unavailable</html>").unwrap();

        let err = unpack(&source, &dest, "world.content").unwrap_err();
        assert_eq!(*err, ErrorKind::UnsupportedFormat);
        assert!(leftovers(data.path()).is_empty());
    }
}
