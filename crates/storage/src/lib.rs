//! Local storage for installed content snapshots.
//!
//! One [`DatasetDir`] per dataset. Names coming from upstream (content paths,
//! archive entries) are never trusted: they are reduced to a basename with
//! [`sanitize_file_name`] and verified to stay inside the dataset directory
//! before anything touches the filesystem.

mod dir;
pub mod error;
mod path;

pub use crate::dir::{ARCHIVE_SUFFIX, ContentFile, DatasetDir, PARTIAL_SUFFIX};
pub use crate::path::sanitize_file_name;
