//! Version cache for upstream manifests and daily vendor offers.
//!
//! Upstream publishes a small manifest naming the current content package,
//! with HTTP freshness headers saying how long it may be reused. This crate
//! keeps the latest manifest (and daily vendor offers) in an external
//! key-value store so that every process does not have to hit upstream.
//!
//! # Architecture
//! - [`CacheStore`]: the raw store, a string key-value map with expiry.
//!   SQLite by default, Redis behind the `redis` feature, in-memory behind
//!   the `mock` feature.
//! - [`VersionCache`]: typed, namespaced access with soft failure semantics.
//! - [`DailyReset`]: when daily content rotates, which bounds the lifetime of
//!   vendor offers.

pub mod error;
mod models;
mod reset;
pub mod store;
mod version;

pub use crate::models::{
    CacheEntry, CachedManifest, Expiry, Manifest, ManifestData, ManifestMeta, ManifestUpdate, SetOutcome,
};
pub use crate::reset::DailyReset;
pub use crate::store::CacheStore;
pub use crate::version::{Clock, VersionCache};
