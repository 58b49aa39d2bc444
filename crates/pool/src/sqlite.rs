use crate::error::{ErrorKind, Result};
use crate::{ResultSet, Row, WorkerPool, WorkerTask};
use async_trait::async_trait;
use exn::ResultExt;
use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{Connection, Row as _, SqliteConnection};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Semaphore;
use tracing::{debug, instrument};

/// Worker pool backed by SQLite connections.
///
/// Every task opens its own read-only connection. Each sqlx SQLite connection
/// runs statements on a dedicated worker thread, so the async caller only
/// awaits results. A semaphore caps how many tasks execute at once.
#[derive(Debug)]
pub struct SqliteWorkerPool {
    permits: Arc<Semaphore>,
    size: NonZeroU32,
    closed: AtomicBool,
}

impl SqliteWorkerPool {
    pub fn new(size: NonZeroU32) -> Self {
        Self { permits: Arc::new(Semaphore::new(size.get() as usize)), size, closed: AtomicBool::new(false) }
    }

    /// Maximum number of tasks executing at once.
    pub fn size(&self) -> u32 {
        self.size.get()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn execute(task: &WorkerTask) -> Result<Vec<ResultSet>> {
        let path = &task.dataset_path;
        let options = SqliteConnectOptions::new().filename(path).read_only(true).create_if_missing(false);
        let mut conn = SqliteConnection::connect_with(&options).await.or_raise(|| ErrorKind::Open(path.clone()))?;
        let mut results = Vec::with_capacity(task.queries.len());
        for query in &task.queries {
            let rows = sqlx::query(query)
                .fetch_all(&mut conn)
                .await
                .or_raise(|| ErrorKind::Query(query.clone()))?;
            results.push(rows.iter().map(decode).collect::<Result<ResultSet>>()?);
        }
        // Read-only; nothing to flush, and a failed close loses nothing.
        _ = conn.close().await;
        Ok(results)
    }
}

/// The `json` column may be stored as TEXT or BLOB depending on the
/// publisher's tooling, so skip sqlx's type check and decode the raw bytes.
fn decode(row: &SqliteRow) -> Result<Row> {
    let bytes: Vec<u8> = row.try_get_unchecked("json").or_raise(|| ErrorKind::Decode)?;
    let payload = String::from_utf8(bytes).or_raise(|| ErrorKind::Decode)?;
    let id = row.try_get::<i64, _>("id").ok();
    Ok(Row { id, payload })
}

#[async_trait]
impl WorkerPool for SqliteWorkerPool {
    #[instrument(
        level = "debug",
        skip(self, task),
        fields(dataset = %task.dataset_path.display(), queries = task.queries.len())
    )]
    async fn run(&self, task: WorkerTask) -> Result<Vec<ResultSet>> {
        if self.is_closed() {
            exn::bail!(ErrorKind::Closed);
        }
        // Acquisition fails once the semaphore has been closed by `close`.
        let _permit = self.permits.acquire().await.or_raise(|| ErrorKind::Closed)?;
        let results = Self::execute(&task).await?;
        debug!(rows = results.iter().map(Vec::len).sum::<usize>(), "worker task complete");
        Ok(results)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        // Waiting for every permit means every in-flight task has finished.
        // Concurrent callers queue behind the first and see the closed
        // semaphore once it is done.
        if let Ok(drained) = self.permits.acquire_many(self.size.get()).await {
            drained.forget();
            self.permits.close();
            debug!("worker pool closed");
        }
    }
}
