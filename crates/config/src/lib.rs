//! Layered configuration.
//!
//! Sources, later ones overriding earlier ones:
//! 1. built-in defaults
//! 2. a config file (TOML, YAML or JSON, chosen by extension), either given
//!    explicitly or `kiosk.toml` in the platform config directory
//! 3. environment variables prefixed `KIOSK_`, nested with `__`
//!    (`KIOSK_POOL__SIZE=8`)

pub mod error;
mod model;

pub use crate::model::{CacheBackend, CacheConfig, Config, DatasetConfig, PoolConfig, Readiness};
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

const ENV_PREFIX: &str = "KIOSK_";
const DEFAULT_FILE_NAME: &str = "kiosk.toml";

impl Config {
    /// `kiosk.toml` in the platform config directory, if one can be determined.
    pub fn default_path() -> Option<PathBuf> {
        model::project_dirs().map(|dirs| dirs.config_dir().join(DEFAULT_FILE_NAME))
    }

    /// Load and validate configuration.
    ///
    /// An explicit `path` must exist; the default location is skipped when
    /// absent.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let figment = Self::figment(path)?.merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::from_figment(figment)
    }

    /// Defaults plus the config file, without the environment layer.
    pub fn figment(path: Option<&Path>) -> Result<Figment> {
        let figment = Figment::from(Serialized::defaults(Config::default()));
        let file = match path {
            Some(path) if !path.is_file() => exn::bail!(ErrorKind::NotFound(path.to_path_buf())),
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path().filter(|path| path.is_file()),
        };
        let Some(file) = file else {
            debug!("no config file, using defaults and environment");
            return Ok(figment);
        };
        debug!(path = %file.display(), "loading config file");
        let extension = file.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase);
        Ok(match extension.as_deref() {
            Some("toml") => figment.merge(Toml::file_exact(&file)),
            Some("yaml" | "yml") => figment.merge(Yaml::file_exact(&file)),
            Some("json") => figment.merge(Json::file_exact(&file)),
            _ => exn::bail!(ErrorKind::UnsupportedFormat(file)),
        })
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.datasets.is_empty() {
            exn::bail!(ErrorKind::Invalid("no datasets configured".into()));
        }
        let mut names = HashSet::new();
        for dataset in &self.datasets {
            dataset.validate()?;
            if !names.insert(dataset.name.as_str()) {
                exn::bail!(ErrorKind::Invalid(format!("duplicate dataset name {:?}", dataset.name)));
            }
        }
        if self.pool.size == 0 {
            exn::bail!(ErrorKind::Invalid("pool size must be at least 1".into()));
        }
        self.cache.validate()
    }
}

impl DatasetConfig {
    fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| ErrorKind::Invalid(format!("dataset {:?}: {reason}", self.name));
        if self.name.trim().is_empty() {
            exn::bail!(ErrorKind::Invalid("dataset name must not be empty".into()));
        }
        if !self.directory.is_absolute() {
            exn::bail!(invalid("directory must be absolute"));
        }
        if !is_http_url(&self.manifest_url) {
            exn::bail!(invalid("manifest_url must be an http(s) URL"));
        }
        if !is_http_url(&self.content_url) {
            exn::bail!(invalid("content_url must be an http(s) URL"));
        }
        if self.locale.trim().is_empty() {
            exn::bail!(invalid("locale must not be empty"));
        }
        Ok(())
    }
}

impl CacheConfig {
    fn validate(&self) -> Result<()> {
        if self.reset_hour > 23 {
            exn::bail!(ErrorKind::Invalid(format!("reset_hour {} is not an hour of the day", self.reset_hour)));
        }
        match self.backend {
            CacheBackend::Sqlite if self.path.is_none() => {
                exn::bail!(ErrorKind::Invalid("sqlite cache needs a path".into()))
            },
            CacheBackend::Redis if self.url.as_deref().is_none_or(|url| url.trim().is_empty()) => {
                exn::bail!(ErrorKind::Invalid("redis cache needs a url".into()))
            },
            _ => Ok(()),
        }
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("https://") || url.starts_with("http://")
}
