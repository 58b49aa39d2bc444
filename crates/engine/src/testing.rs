//! Shared test fixtures.

use crate::dataset::Category;
use crate::model::ManifestDescriptor;
use async_trait::async_trait;
use kiosk_pool::error::{ErrorKind as PoolErrorKind, Result as PoolResult};
use kiosk_pool::{ResultSet, Row, WorkerPool, WorkerTask};
use serde_json::Value;
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use time::macros::datetime;
use tokio::sync::Semaphore;
use zip::write::SimpleFileOptions;

pub(crate) fn descriptor(version: &str, content_path: &str) -> ManifestDescriptor {
    ManifestDescriptor {
        version: version.into(),
        content_path: content_path.into(),
        last_modified: datetime!(2024-05-10 12:00 UTC),
        max_age: 300,
    }
}

pub(crate) fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, contents) in entries {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(contents).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Worker pool serving canned records per `(file, table)`.
///
/// Tables without records answer with no rows. A gated pool holds every task
/// until [`FakePool::release`] hands out permits, one per task.
#[derive(Debug)]
pub(crate) struct FakePool {
    records: Mutex<HashMap<(String, String), Vec<Row>>>,
    gate: Option<Semaphore>,
    failing: AtomicBool,
    runs: AtomicUsize,
}

impl FakePool {
    pub(crate) fn new() -> Self {
        Self { records: Mutex::default(), gate: None, failing: AtomicBool::new(false), runs: AtomicUsize::new(0) }
    }

    pub(crate) fn gated() -> Self {
        Self { gate: Some(Semaphore::new(0)), ..Self::new() }
    }

    pub(crate) fn insert(&self, file: &str, category: Category, records: impl IntoIterator<Item = Value>) {
        let rows = records.into_iter().map(|record| Row { id: None, payload: record.to_string() });
        self.records
            .lock()
            .unwrap()
            .entry((file.to_string(), category.table().to_string()))
            .or_default()
            .extend(rows);
    }

    /// Let `tasks` more gated tasks through.
    pub(crate) fn release(&self, tasks: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(tasks);
        }
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub(crate) fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkerPool for FakePool {
    async fn run(&self, task: WorkerTask) -> PoolResult<Vec<ResultSet>> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            match gate.acquire().await {
                Ok(permit) => permit.forget(),
                Err(_) => exn::bail!(PoolErrorKind::Closed),
            }
        }
        if self.failing.load(Ordering::SeqCst) {
            exn::bail!(PoolErrorKind::Open(task.dataset_path));
        }
        let file = task.dataset_path.file_name().unwrap().to_string_lossy().into_owned();
        let records = self.records.lock().unwrap();
        Ok(task
            .queries
            .iter()
            .map(|query| {
                let table = query.rsplit(' ').next().unwrap().to_string();
                records.get(&(file.clone(), table)).cloned().unwrap_or_default()
            })
            .collect())
    }

    async fn close(&self) {}
}
