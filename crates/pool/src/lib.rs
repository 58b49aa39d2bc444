//! Worker pool for dataset queries.
//!
//! Content datasets are read once per version with a fixed set of full-table
//! queries. Those reads are large and synchronous at the SQLite level, so they
//! never run on the request-serving tasks: a [`WorkerPool`] executes each
//! [`WorkerTask`] elsewhere and hands back the decoded rows.
//!
//! Tasks are pure functions of `(dataset_path, queries)`. Nothing is shared
//! between them, so a failed task cannot affect the next one.

pub mod error;
mod sqlite;

pub use crate::sqlite::SqliteWorkerPool;
use crate::error::Result;
use async_trait::async_trait;
use std::fmt::Debug;
use std::path::PathBuf;

/// One unit of work: run `queries` in order against the dataset file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerTask {
    pub dataset_path: PathBuf,
    pub queries: Vec<String>,
}

impl WorkerTask {
    pub fn new(dataset_path: impl Into<PathBuf>, queries: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self { dataset_path: dataset_path.into(), queries: queries.into_iter().map(Into::into).collect() }
    }
}

/// A result row: the record's JSON text, plus its integer key when the table
/// has one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub id: Option<i64>,
    pub payload: String,
}

/// All rows returned by one query.
pub type ResultSet = Vec<Row>;

/// Executes [`WorkerTask`]s with bounded concurrency.
///
/// Failures are returned as values; a failing task never takes the pool down.
#[async_trait]
pub trait WorkerPool: Debug + Send + Sync {
    /// Run a task, returning one [`ResultSet`] per query in submission order.
    async fn run(&self, task: WorkerTask) -> Result<Vec<ResultSet>>;

    /// Stop accepting work and wait for in-flight tasks to finish.
    ///
    /// Calling `close` more than once is harmless.
    async fn close(&self);
}
