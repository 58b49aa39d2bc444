//! Content snapshot synchronization and the embedded query engine.
//!
//! Upstream periodically publishes a manifest naming the current content
//! package: a zip archive holding an SQLite database of JSON records. This
//! crate keeps one local copy of that database per dataset and answers lookups
//! against it from memory.
//!
//! # Architecture
//! - [`upstream`]: the manifest and package source ([`HttpUpstream`]).
//! - [`ManifestService`]: the current manifest, through the version cache.
//! - [`Installer`]: downloads and unpacks a package into a dataset directory.
//! - [`Dataset`]: bootstraps a content file into immutable in-memory indices
//!   through a [`WorkerPool`](kiosk_pool::WorkerPool) and serves lookups.
//! - [`Synchronizer`]: one fetch, compare and install cycle across datasets.

pub mod dataset;
pub mod error;
mod install;
mod model;
mod service;
mod sync;
#[cfg(test)]
mod testing;
pub mod upstream;

pub use crate::dataset::{
    Bootstrap, Category, Dataset, DatasetOptions, DatasetState, Indices, ItemMatch, ReadinessPolicy, UpdateOutcome,
};
pub use crate::install::{InstallOutcome, Installer};
pub use crate::model::{ManifestDescriptor, ManifestResponse};
pub use crate::service::ManifestService;
pub use crate::sync::{SyncOutcome, SyncReport, SyncTarget, Synchronizer};
pub use crate::upstream::{FetchedManifest, HttpUpstream, Upstream};
