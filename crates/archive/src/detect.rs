use crate::ArchiveFormat;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::fs::File;
use std::io::Read;
use std::path::Path;

const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];
// An archive with no entries only has the end-of-central-directory record.
const ZIP_EMPTY_MAGIC: [u8; 4] = [0x50, 0x4B, 0x05, 0x06];
const BZIP2_MAGIC: [u8; 3] = [0x42, 0x5A, 0x68];
const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];
const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";
const HEAD_LEN: usize = 16;

impl ArchiveFormat {
    /// Detect the payload format from its leading bytes.
    ///
    /// Returns `None` if nothing matches or the input is too short.
    #[must_use]
    pub fn from_magic_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&ZIP_MAGIC) || bytes.starts_with(&ZIP_EMPTY_MAGIC) {
            return Some(Self::Zip);
        }
        if bytes.starts_with(&GZIP_MAGIC) {
            return Some(Self::Gzip);
        }
        if bytes.starts_with(&BZIP2_MAGIC) {
            return Some(Self::Bzip2);
        }
        if bytes.starts_with(SQLITE_MAGIC) {
            return Some(Self::Raw);
        }
        None
    }

    /// Detect the format of a file on disk by reading its first few bytes.
    pub fn detect(path: &Path) -> Result<Self> {
        let file = File::open(path).or_raise(|| ErrorKind::Io)?;
        let mut head = Vec::with_capacity(HEAD_LEN);
        file.take(HEAD_LEN as u64).read_to_end(&mut head).or_raise(|| ErrorKind::Io)?;
        match Self::from_magic_bytes(&head) {
            Some(format) => Ok(format),
            None => exn::bail!(ErrorKind::UnsupportedFormat),
        }
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::Gzip => "gzip",
            Self::Bzip2 => "bzip2",
            Self::Raw => "raw",
        }
    }
}

impl Display for ArchiveFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use crate::ArchiveFormat;
    use crate::error::ErrorKind;
    use rstest::rstest;

    #[rstest]
    #[case(b"PK\x03\x04\x14\x00", Some(ArchiveFormat::Zip))]
    #[case(b"PK\x05\x06\x00\x00", Some(ArchiveFormat::Zip))]
    #[case(&[0x1F, 0x8B, 0x08, 0x00], Some(ArchiveFormat::Gzip))]
    #[case(&[0x42, 0x5A, 0x68, 0x39], Some(ArchiveFormat::Bzip2))]
    #[case(b"SQLite format 3\0\x10\x00", Some(ArchiveFormat::Raw))]
    #[case(b"SQLite format", None)]
    #[case(b"<!DOCTYPE html>", None)]
    #[case(b"", None)]
    fn test_from_magic_bytes(#[case] bytes: &[u8], #[case] expected: Option<ArchiveFormat>) {
        assert_eq!(ArchiveFormat::from_magic_bytes(bytes), expected);
    }

    #[test]
    fn test_detect_unknown_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"<html>maintenance</html>").unwrap();
        let err = ArchiveFormat::detect(file.path()).unwrap_err();
        assert_eq!(*err, ErrorKind::UnsupportedFormat);
    }

    #[test]
    fn test_detect_missing_file() {
        let err = ArchiveFormat::detect(std::path::Path::new("/nonexistent/archive.zip")).unwrap_err();
        assert_eq!(*err, ErrorKind::Io);
    }
}
