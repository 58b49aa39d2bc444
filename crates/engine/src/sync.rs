//! Synchronization orchestrator.
//!
//! One cycle fetches the latest manifest for every dataset and installs the
//! ones that are stale, all concurrently. Every dataset's outcome is
//! collected; one dataset failing never stops the others.
//!
//! Concurrent cycles for different datasets are fine. Callers must not run two
//! cycles for the *same* dataset at once: nothing here guards against the
//! redundant download that would cause.

use crate::dataset::{Dataset, UpdateOutcome};
use crate::error::Result;
use crate::model::ManifestDescriptor;
use crate::service::ManifestService;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{error, info, instrument};

/// A dataset together with the service resolving its manifest.
#[derive(Debug, Clone)]
pub struct SyncTarget {
    pub name: String,
    pub service: ManifestService,
    pub dataset: Arc<Dataset>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The manifest's content was already installed.
    Current(ManifestDescriptor),
    /// New content was installed and is now being served.
    Updated(ManifestDescriptor),
}

impl SyncOutcome {
    pub fn manifest(&self) -> &ManifestDescriptor {
        match self {
            Self::Current(manifest) | Self::Updated(manifest) => manifest,
        }
    }
}

#[derive(Debug)]
pub struct SyncReport {
    pub dataset: String,
    pub outcome: Result<SyncOutcome>,
}

#[derive(Debug, Clone, Default)]
pub struct Synchronizer {
    targets: Vec<SyncTarget>,
    skip_cache: bool,
}

impl Synchronizer {
    pub fn new(targets: Vec<SyncTarget>) -> Self {
        Self { targets, skip_cache: false }
    }

    /// Always ask upstream for the manifest, bypassing the version cache.
    pub fn with_skip_cache(mut self, skip_cache: bool) -> Self {
        self.skip_cache = skip_cache;
        self
    }

    pub fn targets(&self) -> &[SyncTarget] {
        &self.targets
    }

    /// Run one fetch, compare and install cycle per dataset.
    ///
    /// Reports come back in target order, one per dataset.
    #[instrument(skip(self), fields(datasets = self.targets.len()))]
    pub async fn upsert_manifests(&self) -> Vec<SyncReport> {
        let reports = join_all(self.targets.iter().map(|target| async move {
            let outcome = self.upsert(target).await;
            match &outcome {
                Ok(SyncOutcome::Updated(manifest)) => {
                    info!(dataset = %target.name, version = %manifest.version, "dataset updated");
                },
                Ok(SyncOutcome::Current(manifest)) => {
                    info!(dataset = %target.name, version = %manifest.version, "dataset is current");
                },
                Err(err) => error!(dataset = %target.name, error = ?err, "dataset sync failed"),
            }
            SyncReport { dataset: target.name.clone(), outcome }
        }))
        .await;
        let failed = reports.iter().filter(|report| report.outcome.is_err()).count();
        info!(failed, "sync cycle finished");
        reports
    }

    async fn upsert(&self, target: &SyncTarget) -> Result<SyncOutcome> {
        let response = target.service.get_manifest(self.skip_cache).await?;
        let manifest = response.manifest;
        Ok(match target.dataset.update_manifest(&manifest).await? {
            UpdateOutcome::Current { .. } => SyncOutcome::Current(manifest),
            UpdateOutcome::Updated { .. } => SyncOutcome::Updated(manifest),
        })
    }
}
