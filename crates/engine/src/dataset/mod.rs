//! In-memory query engine over one content dataset.
//!
//! A [`Dataset`] owns a directory of content files. At any time at most one of
//! them is *active*: its records have been read through the worker pool and
//! parsed into an immutable [`Indices`] snapshot, which every lookup reads.
//!
//! Bootstrapping a new file builds a fresh snapshot off to the side and
//! publishes it with a single swap, so a lookup sees either the whole old
//! snapshot or the whole new one. Concurrent requests to bootstrap the same
//! file share one in-flight bootstrap.

mod category;
mod indices;
mod lookup;

pub use self::category::Category;
pub use self::indices::Indices;
pub use self::lookup::ItemMatch;
use crate::error::{Error, ErrorKind, Result, describe};
use crate::install::Installer;
use crate::model::ManifestDescriptor;
use exn::{OptionExt, ResultExt};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use kiosk_pool::{WorkerPool, WorkerTask};
use kiosk_storage::DatasetDir;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

/// A bootstrap that may still be running. Any number of callers can await
/// the same handle.
pub type Bootstrap = Shared<BoxFuture<'static, std::result::Result<Arc<Indices>, ErrorKind>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetState {
    /// Nothing has been published yet and nothing is loading.
    Uninitialized,
    /// A bootstrap is in flight. Any previously published snapshot is still
    /// served meanwhile.
    Bootstrapping,
    Ready,
}

/// What a lookup does when no snapshot has been published yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessPolicy {
    /// Wait for the first snapshot, however long it takes.
    Wait,
    /// Wait up to the given duration, then fail with [`ErrorKind::NotReady`].
    Timeout(Duration),
    /// Only wait for a bootstrap that is already in flight.
    FailFast,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self::Timeout(Duration::from_secs(30))
    }
}

#[derive(Debug, Clone)]
pub struct DatasetOptions {
    pub name: String,
    pub directory: PathBuf,
    /// Base URL that relative icon paths in records are resolved against.
    pub content_url: String,
    pub readiness: ReadinessPolicy,
    /// Remove superseded content files after a successful update.
    pub prune_superseded: bool,
    /// Record categories to load. Lookups into any other category find
    /// nothing.
    pub categories: Vec<Category>,
    /// Start bootstrapping the content already on disk when opening.
    /// Processes that only install new content can turn this off.
    pub load_on_open: bool,
}

impl DatasetOptions {
    pub fn new(name: impl Into<String>, directory: impl Into<PathBuf>, content_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            directory: directory.into(),
            content_url: content_url.into(),
            readiness: ReadinessPolicy::default(),
            prune_superseded: false,
            categories: Category::ALL.to_vec(),
            load_on_open: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The content file named by the manifest is already on disk.
    Current { file: String },
    /// The content was installed and its snapshot published.
    Updated { file: String, pruned: Vec<String> },
}

impl UpdateOutcome {
    pub fn file(&self) -> &str {
        match self {
            Self::Current { file } | Self::Updated { file, .. } => file,
        }
    }
}

#[derive(Default)]
struct Slot {
    /// File whose snapshot is published.
    active: Option<String>,
    /// File of the most recently started bootstrap.
    target: Option<String>,
    bootstrap: Option<Bootstrap>,
    in_flight: bool,
}

struct Core {
    name: String,
    dir: DatasetDir,
    pool: Arc<dyn WorkerPool>,
    categories: Vec<Category>,
    slot: Mutex<Slot>,
    published: watch::Sender<Option<Arc<Indices>>>,
}

impl Core {
    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start bootstrapping `file`, or join the bootstrap already running for it.
    fn start_bootstrap(self: &Arc<Self>, file: String) -> Bootstrap {
        let mut slot = self.slot();
        if slot.target.as_deref() == Some(file.as_str())
            && (slot.in_flight || slot.active.as_deref() == Some(file.as_str()))
            && let Some(handle) = &slot.bootstrap
        {
            return handle.clone();
        }
        debug!(dataset = %self.name, file, "starting bootstrap");
        slot.target = Some(file.clone());
        slot.in_flight = true;
        let task = tokio::spawn(Arc::clone(self).bootstrap(file.clone()));
        let handle = async move {
            task.await.unwrap_or_else(|e| Err(ErrorKind::Bootstrap { file, cause: e.to_string() }))
        }
        .boxed()
        .shared();
        slot.bootstrap = Some(handle.clone());
        handle
    }

    async fn bootstrap(self: Arc<Self>, file: String) -> std::result::Result<Arc<Indices>, ErrorKind> {
        let started = Instant::now();
        let result = self.load(&file).await;

        let mut slot = self.slot();
        let current = slot.target.as_deref() == Some(file.as_str());
        if current {
            slot.in_flight = false;
        }
        match result {
            Ok(indices) => {
                let indices = Arc::new(indices);
                if current {
                    slot.active = Some(file.clone());
                    self.published.send_replace(Some(Arc::clone(&indices)));
                    info!(
                        dataset = %self.name,
                        file,
                        items = indices.len(Category::Items),
                        elapsed_ms = started.elapsed().as_millis(),
                        "dataset ready"
                    );
                } else {
                    debug!(dataset = %self.name, file, "bootstrap superseded, not publishing");
                }
                Ok(indices)
            },
            Err(err) => {
                error!(dataset = %self.name, file, error = ?err, "bootstrap failed");
                Err(ErrorKind::Bootstrap { file, cause: describe(&err) })
            },
        }
    }

    /// Read every configured category through the pool and index the rows.
    async fn load(&self, file: &str) -> Result<Indices> {
        let path = self.dir.resolve(file).or_raise(|| ErrorKind::Storage)?;
        let reads = self.categories.iter().map(|&category| {
            let task = WorkerTask::new(&path, [category.query()]);
            async move {
                let sets = self.pool.run(task).await.or_raise(|| ErrorKind::Worker)?;
                Ok::<_, Error>((category, sets))
            }
        });
        let results = futures::future::try_join_all(reads).await?;
        // Parsing the full record set is CPU-bound.
        tokio::task::spawn_blocking(move || Indices::build(results)).await.or_raise(|| ErrorKind::Worker)?
    }
}

/// A content dataset and its query engine.
pub struct Dataset {
    core: Arc<Core>,
    installer: Installer,
    content_url: String,
    readiness: ReadinessPolicy,
    prune_superseded: bool,
}

impl Debug for Dataset {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Dataset")
            .field("name", &self.core.name)
            .field("dir", &self.core.dir.root())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Dataset {
    /// Open the dataset directory and, unless `load_on_open` is off, start
    /// bootstrapping its most recent content file. Does not wait for the
    /// bootstrap.
    #[instrument(skip_all, fields(dataset = %options.name))]
    pub async fn open(options: DatasetOptions, pool: Arc<dyn WorkerPool>, installer: Installer) -> Result<Self> {
        let dir = DatasetDir::new(&options.directory).or_raise(|| ErrorKind::Storage)?;
        let latest = dir.latest().await.or_raise(|| ErrorKind::Storage)?;
        let (published, _) = watch::channel(None);
        let core = Arc::new(Core {
            name: options.name,
            dir,
            pool,
            categories: options.categories,
            slot: Mutex::default(),
            published,
        });
        match latest {
            Some(file) if options.load_on_open => {
                info!(file = %file.name, "found content on disk");
                let _ = core.start_bootstrap(file.name);
            },
            Some(file) => debug!(file = %file.name, "found content on disk, not loading"),
            None => info!("no content on disk yet"),
        }
        Ok(Self {
            core,
            installer,
            content_url: options.content_url,
            readiness: options.readiness,
            prune_superseded: options.prune_superseded,
        })
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn directory(&self) -> &DatasetDir {
        &self.core.dir
    }

    pub fn state(&self) -> DatasetState {
        let slot = self.core.slot();
        if slot.in_flight {
            DatasetState::Bootstrapping
        } else if slot.active.is_some() {
            DatasetState::Ready
        } else {
            DatasetState::Uninitialized
        }
    }

    /// File whose snapshot lookups currently read.
    pub fn current_file(&self) -> Option<String> {
        self.core.slot().active.clone()
    }

    /// Handle to the most recently started bootstrap.
    pub fn bootstrapped(&self) -> Option<Bootstrap> {
        self.core.slot().bootstrap.clone()
    }

    /// The published snapshot, without waiting.
    pub fn snapshot(&self) -> Option<Arc<Indices>> {
        self.core.published.borrow().clone()
    }

    /// Make the content named by `manifest` the active snapshot.
    ///
    /// If its file is already on disk nothing happens. Otherwise the content
    /// is installed and bootstrapped; lookups keep reading the previous
    /// snapshot until the new one is complete. Content that fails to
    /// bootstrap is removed again, so the next update retries the install.
    #[instrument(skip_all, fields(dataset = %self.core.name, version = %manifest.version))]
    pub async fn update_manifest(&self, manifest: &ManifestDescriptor) -> Result<UpdateOutcome> {
        let file = manifest.file_name()?;
        if self.core.dir.exists(&file).await.or_raise(|| ErrorKind::Storage)? {
            debug!(file, "content is current");
            return Ok(UpdateOutcome::Current { file });
        }
        self.installer.install(&self.core.dir, manifest).await?;
        if let Err(kind) = self.core.start_bootstrap(file.clone()).await {
            if let Err(err) = self.core.dir.remove(&file).await {
                warn!(file, error = ?err, "could not remove content that failed to bootstrap");
            }
            exn::bail!(kind);
        }
        let pruned = if self.prune_superseded { self.prune_superseded().await? } else { Vec::new() };
        Ok(UpdateOutcome::Updated { file, pruned })
    }

    /// Delete content files other than the active one and the one being
    /// bootstrapped. Returns the removed names.
    pub async fn prune_superseded(&self) -> Result<Vec<String>> {
        let keep: Vec<String> = {
            let slot = self.core.slot();
            slot.active.iter().chain(slot.target.iter()).cloned().collect()
        };
        if keep.is_empty() {
            return Ok(Vec::new());
        }
        let mut removed = Vec::new();
        for file in self.core.dir.list().await.or_raise(|| ErrorKind::Storage)? {
            if keep.contains(&file.name) {
                continue;
            }
            self.core.dir.remove(&file.name).await.or_raise(|| ErrorKind::Storage)?;
            removed.push(file.name);
        }
        if !removed.is_empty() {
            info!(dataset = %self.core.name, ?removed, "pruned superseded content");
        }
        Ok(removed)
    }

    /// The snapshot lookups should read, honouring the readiness policy.
    async fn indices(&self) -> Result<Arc<Indices>> {
        let rx = self.core.published.subscribe();
        let published = rx.borrow().clone();
        if let Some(indices) = published {
            return Ok(indices);
        }
        match self.readiness {
            ReadinessPolicy::Wait => self.wait(rx).await,
            ReadinessPolicy::Timeout(limit) => tokio::time::timeout(limit, self.wait(rx))
                .await
                .or_raise(|| ErrorKind::NotReady(self.core.name.clone()))?,
            ReadinessPolicy::FailFast => {
                let pending = {
                    let slot = self.core.slot();
                    if slot.in_flight { slot.bootstrap.clone() } else { None }
                };
                let handle = pending.ok_or_raise(|| ErrorKind::NotReady(self.core.name.clone()))?;
                handle.await.map_err(Error::from).or_raise(|| ErrorKind::NotReady(self.core.name.clone()))
            },
        }
    }

    async fn wait(&self, mut rx: watch::Receiver<Option<Arc<Indices>>>) -> Result<Arc<Indices>> {
        let published = rx.wait_for(Option::is_some).await.or_raise(|| ErrorKind::NotReady(self.core.name.clone()))?;
        (*published).clone().ok_or_raise(|| ErrorKind::NotReady(self.core.name.clone()))
    }
}
