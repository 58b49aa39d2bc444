//! Content archive handling.
//!
//! Upstream publishes each content revision as a compressed package. This
//! crate detects the package format from its magic bytes and unpacks it
//! entry by entry into a [`DatasetDir`](kiosk_storage::DatasetDir):
//!
//! - **Zip** archives (the usual case), one or more entries
//! - **Gzip** / **Bzip2** single-stream payloads
//! - **Raw** SQLite databases served without compression
//!
//! Extraction is synchronous and streaming; callers in async code should run
//! [`unpack`] on a blocking thread.

mod detect;
pub mod error;
mod unpack;

pub use crate::unpack::{Unpacked, unpack};

/// A recognised content package format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    /// PKZIP archive (.zip)
    Zip,
    /// Gzip stream (.gz)
    Gzip,
    /// Bzip2 stream (.bz2)
    Bzip2,
    /// Uncompressed SQLite database
    Raw,
}
