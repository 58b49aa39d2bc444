//! Wiring from configuration to running datasets.

use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use kiosk_cache::store::{RedisStore, SqliteStore};
use kiosk_cache::{CacheStore, DailyReset, VersionCache};
use kiosk_config::{CacheBackend, Config, DatasetConfig, Readiness};
use kiosk_engine::{
    Category, Dataset, DatasetOptions, HttpUpstream, Installer, ManifestService, ReadinessPolicy, SyncReport,
    SyncTarget, Synchronizer,
};
use kiosk_pool::{SqliteWorkerPool, WorkerPool};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub struct App {
    config: Config,
    pool: Arc<SqliteWorkerPool>,
    sqlite: Option<Arc<SqliteStore>>,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let size = NonZeroU32::new(config.pool.size).ok_or_raise(|| ErrorKind::Setup)?;
        Ok(Self { config, pool: Arc::new(SqliteWorkerPool::new(size)), sqlite: None })
    }

    fn readiness(&self) -> ReadinessPolicy {
        match self.config.readiness {
            Readiness::Wait => ReadinessPolicy::Wait,
            Readiness::Timeout { seconds } => ReadinessPolicy::Timeout(Duration::from_secs(seconds)),
            Readiness::FailFast => ReadinessPolicy::FailFast,
        }
    }

    fn upstream(dataset: &DatasetConfig) -> Result<Arc<HttpUpstream>> {
        let upstream = HttpUpstream::new(&dataset.manifest_url, &dataset.content_url, dataset.api_key.clone())
            .or_raise(|| ErrorKind::Setup)?;
        Ok(Arc::new(upstream))
    }

    fn categories(dataset: &DatasetConfig) -> Result<Vec<Category>> {
        if dataset.categories.is_empty() {
            return Ok(Category::ALL.to_vec());
        }
        let mut categories = Vec::with_capacity(dataset.categories.len());
        for name in &dataset.categories {
            let category: Category = name.parse::<Category>().or_raise(|| ErrorKind::Config)?;
            if !categories.contains(&category) {
                categories.push(category);
            }
        }
        Ok(categories)
    }

    /// `load` starts bootstrapping content already on disk; syncing only
    /// installs and has no use for it.
    async fn open(&self, dataset: &DatasetConfig, load: bool) -> Result<Dataset> {
        let mut options = DatasetOptions::new(&dataset.name, &dataset.directory, &dataset.content_url);
        options.readiness = self.readiness();
        options.prune_superseded = self.config.prune_superseded;
        options.categories = Self::categories(dataset)?;
        options.load_on_open = load;
        let pool: Arc<dyn WorkerPool> = self.pool.clone();
        let installer = Installer::new(Self::upstream(dataset)?);
        Dataset::open(options, pool, installer).await.or_raise(|| ErrorKind::Setup)
    }

    /// Open a single configured dataset.
    pub async fn dataset(&self, name: &str) -> Result<Dataset> {
        let dataset = self.config.dataset(name).ok_or_raise(|| ErrorKind::UnknownDataset(name.to_string()))?;
        self.open(dataset, true).await
    }

    async fn cache(&mut self) -> Result<VersionCache> {
        let settings = &self.config.cache;
        let store: Arc<dyn CacheStore> = match settings.backend {
            CacheBackend::Sqlite => {
                let path = settings.path.as_deref().ok_or_raise(|| ErrorKind::Setup)?;
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await.or_raise(|| ErrorKind::Setup)?;
                }
                let store = Arc::new(SqliteStore::connect(path).await.or_raise(|| ErrorKind::Setup)?);
                self.sqlite = Some(Arc::clone(&store));
                store
            },
            CacheBackend::Redis => {
                let url = settings.url.as_deref().ok_or_raise(|| ErrorKind::Setup)?;
                Arc::new(RedisStore::open(url).or_raise(|| ErrorKind::Setup)?)
            },
        };
        debug!(store = store.name(), "cache store ready");
        let reset = DailyReset::new(settings.reset_hour).or_raise(|| ErrorKind::Setup)?;
        Ok(VersionCache::new(store, &settings.namespace).with_reset(reset))
    }

    /// One synchronization cycle across every configured dataset.
    pub async fn sync(&mut self, refresh: bool) -> Result<Vec<SyncReport>> {
        let cache = self.cache().await?;
        let mut targets = Vec::with_capacity(self.config.datasets.len());
        for dataset in &self.config.datasets {
            let service =
                ManifestService::new(Self::upstream(dataset)?, cache.clone(), &dataset.name, &dataset.locale);
            let opened = self.open(dataset, false).await?;
            targets.push(SyncTarget { name: dataset.name.clone(), service, dataset: Arc::new(opened) });
        }
        info!(datasets = targets.len(), refresh, "starting sync");
        Ok(Synchronizer::new(targets).with_skip_cache(refresh).upsert_manifests().await)
    }

    pub async fn shutdown(self) {
        self.pool.close().await;
        if let Some(store) = self.sqlite {
            store.close().await;
        }
    }
}
