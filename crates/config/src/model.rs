use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub(crate) fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "kiosk")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub datasets: Vec<DatasetConfig>,
    pub cache: CacheConfig,
    pub pool: PoolConfig,
    pub readiness: Readiness,
    /// Delete content files left behind by earlier versions after a
    /// successful update.
    pub prune_superseded: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            datasets: Vec::new(),
            cache: CacheConfig::default(),
            pool: PoolConfig::default(),
            readiness: Readiness::default(),
            prune_superseded: true,
        }
    }
}

impl Config {
    pub fn dataset(&self, name: &str) -> Option<&DatasetConfig> {
        self.datasets.iter().find(|dataset| dataset.name == name)
    }
}

/// One independently synchronized content dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Identity used in logs, cache keys and CLI arguments.
    pub name: String,
    /// Endpoint returning the current manifest.
    pub manifest_url: String,
    /// Base URL that manifest content paths (and icon paths) are relative to.
    pub content_url: String,
    /// Absolute directory holding this dataset's content files.
    pub directory: PathBuf,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Record categories to load, by kebab-case name (`items`,
    /// `grimoire-cards`, ...). Empty loads every category.
    #[serde(default)]
    pub categories: Vec<String>,
}

fn default_locale() -> String {
    "en".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Sqlite,
    Redis,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    /// Database file for the `sqlite` backend.
    pub path: Option<PathBuf>,
    /// Connection URL for the `redis` backend.
    pub url: Option<String>,
    /// Prefix for every key, so several deployments can share one store.
    pub namespace: String,
    /// UTC hour at which daily content rotates.
    pub reset_hour: u8,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            path: project_dirs().map(|dirs| dirs.cache_dir().join("cache.sqlite")),
            url: None,
            namespace: "kiosk".to_string(),
            reset_hour: 17,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of dataset queries executing at once.
    pub size: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { size: 4 }
    }
}

/// What a lookup does when its dataset has never finished loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "kebab-case")]
pub enum Readiness {
    /// Wait as long as it takes.
    Wait,
    /// Wait up to `seconds`, then fail.
    Timeout { seconds: u64 },
    /// Fail immediately.
    FailFast,
}

impl Default for Readiness {
    fn default() -> Self {
        Self::Timeout { seconds: 30 }
    }
}
