//! End to end: a real SQLite content database, zipped and served by a local
//! upstream, installed and bootstrapped through the SQLite worker pool.

use async_trait::async_trait;
use futures::StreamExt;
use kiosk_cache::store::MemoryStore;
use kiosk_cache::{Manifest, VersionCache};
use kiosk_engine::error::{ErrorKind, Result};
use kiosk_engine::upstream::ByteStream;
use kiosk_engine::{
    Category, Dataset, DatasetOptions, DatasetState, FetchedManifest, Installer, ManifestService, ReadinessPolicy,
    SyncOutcome, SyncTarget, Synchronizer, Upstream,
};
use kiosk_pool::SqliteWorkerPool;
use serde_json::json;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Connection, SqliteConnection};
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::num::NonZeroU32;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use time::macros::datetime;
use zip::write::SimpleFileOptions;

const CONTENT_PATH: &str = "/common/destiny_content/world_sql_content_5d1c.content";
const FILE: &str = "world_sql_content_5d1c.content";

#[derive(Debug)]
struct StaticUpstream {
    manifest: FetchedManifest,
    packages: HashMap<String, Vec<u8>>,
}

#[async_trait]
impl Upstream for StaticUpstream {
    async fn manifest(&self) -> Result<FetchedManifest> {
        Ok(self.manifest.clone())
    }

    async fn archive(&self, content_path: &str) -> Result<ByteStream> {
        let Some(bytes) = self.packages.get(content_path).cloned() else {
            exn::bail!(ErrorKind::Upstream { code: 404, status: "404".into(), message: content_path.into() });
        };
        let chunks: Vec<Result<Vec<u8>>> = bytes.chunks(4096).map(|chunk| Ok(chunk.to_vec())).collect();
        Ok(futures::stream::iter(chunks).boxed())
    }
}

/// Build a content database with one table per given category.
async fn content_database(path: &Path, categories: &[Category]) {
    let options = SqliteConnectOptions::new().filename(path).create_if_missing(true);
    let mut conn = SqliteConnection::connect_with(&options).await.unwrap();
    for category in categories {
        sqlx::query(&format!("CREATE TABLE {} (id INTEGER PRIMARY KEY NOT NULL, json BLOB)", category.table()))
            .execute(&mut conn)
            .await
            .unwrap();
    }
    let rows = [
        (Category::Items, 1_363_886_209u32, json!({
            "hash": 1_363_886_209u32,
            "displayProperties": {"name": "Gjallarhorn", "icon": "/common/icons/gjallarhorn.jpg"},
            "inventory": {"tierTypeName": "Exotic"},
            "itemTypeDisplayName": "Rocket Launcher",
            "itemCategoryHashes": [1, 4, 13],
        })),
        (Category::ItemCategories, 13, json!({"hash": 13, "displayProperties": {"name": "Rocket Launcher"}})),
        (Category::Classes, 671_679_327, json!({"hash": 671_679_327, "displayProperties": {"name": "Hunter"}})),
        (Category::DamageTypes, 1_847_026_933, json!({"hash": 1_847_026_933, "displayProperties": {"name": "Solar"}})),
        (Category::Lore, 42, json!({"hash": 42, "displayProperties": {"name": "Ghost Fragment"}})),
        (Category::Vendors, 2_190_858_386, json!({"hash": 2_190_858_386u32, "displayProperties": {"icon": "/v/xur.png"}})),
        (Category::GrimoireCards, 101, json!({"cardId": 101, "cardName": "Guardian"})),
    ];
    for (category, hash, record) in rows.into_iter().filter(|(category, ..)| categories.contains(category)) {
        sqlx::query(&format!("INSERT INTO {} (id, json) VALUES (?1, ?2)", category.table()))
            .bind(i64::from(hash as i32))
            .bind(record.to_string().into_bytes())
            .execute(&mut conn)
            .await
            .unwrap();
    }
    conn.close().await.unwrap();
}

fn zip(name: &str, contents: &[u8]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    writer.start_file(name, SimpleFileOptions::default()).unwrap();
    writer.write_all(contents).unwrap();
    writer.finish().unwrap().into_inner()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sync_installs_and_serves_real_content() {
    let scratch = TempDir::new().unwrap();
    let database = scratch.path().join("source.content");
    content_database(&database, &Category::ALL).await;
    let package = zip("world_sql_content_5d1c.content", &std::fs::read(&database).unwrap());

    let upstream = Arc::new(StaticUpstream {
        manifest: FetchedManifest {
            manifest: Manifest {
                version: "89360.24.05.10.1730-1".into(),
                content_paths: [("en".to_string(), CONTENT_PATH.to_string())].into(),
            },
            last_modified: datetime!(2024-05-10 17:30 UTC),
            max_age: 600,
        },
        packages: [(CONTENT_PATH.to_string(), package)].into(),
    });

    let data = TempDir::new().unwrap();
    let mut options = DatasetOptions::new("world", data.path(), "https://www.bungie.net");
    options.readiness = ReadinessPolicy::FailFast;
    options.prune_superseded = true;
    let pool = Arc::new(SqliteWorkerPool::new(NonZeroU32::new(2).unwrap()));
    let dataset = Arc::new(Dataset::open(options, pool.clone(), Installer::new(upstream.clone())).await.unwrap());
    assert_eq!(dataset.state(), DatasetState::Uninitialized);

    let cache = VersionCache::new(Arc::new(MemoryStore::new()), "kiosk");
    let service = ManifestService::new(upstream, cache, "world", "en");
    let sync = Synchronizer::new(vec![SyncTarget { name: "world".into(), service, dataset: Arc::clone(&dataset) }]);

    let reports = sync.upsert_manifests().await;
    assert!(matches!(reports[0].outcome, Ok(SyncOutcome::Updated(_))), "{:?}", reports[0].outcome);
    assert_eq!(dataset.state(), DatasetState::Ready);
    assert_eq!(dataset.current_file().as_deref(), Some(FILE));

    let names: Vec<String> = std::fs::read_dir(data.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, [FILE]);

    let item = dataset.get_item_by_hash(1_363_886_209).await.unwrap().unwrap();
    assert_eq!(item["displayProperties"]["name"], "Gjallarhorn");
    let found = dataset.get_item_by_name("gjallar").await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].icon.as_deref(), Some("https://www.bungie.net/common/icons/gjallarhorn.jpg"));
    assert_eq!(dataset.get_weapon_category(1_363_886_209).await.unwrap().as_deref(), Some("Rocket Launcher"));
    assert!(dataset.get_class_by_hash(671_679_327).await.unwrap().is_some());
    assert!(dataset.get_damage_type_by_hash(1_847_026_933).await.unwrap().is_some());
    assert!(dataset.get_lore(42).await.unwrap().is_some());
    assert_eq!(
        dataset.get_vendor_icon(2_190_858_386).await.unwrap().as_deref(),
        Some("https://www.bungie.net/v/xur.png")
    );
    assert_eq!(dataset.get_grimoire_cards(5).await.unwrap().len(), 1);

    let again = sync.upsert_manifests().await;
    assert!(matches!(again[0].outcome, Ok(SyncOutcome::Current(_))));
}

#[tokio::test]
async fn test_reopening_bootstraps_installed_content() {
    let data = TempDir::new().unwrap();
    content_database(&data.path().join(FILE), &Category::ALL).await;

    let upstream = Arc::new(StaticUpstream {
        manifest: FetchedManifest {
            manifest: Manifest::default(),
            last_modified: datetime!(2024-05-10 17:30 UTC),
            max_age: 0,
        },
        packages: HashMap::new(),
    });
    let mut options = DatasetOptions::new("world", data.path(), "https://www.bungie.net");
    options.readiness = ReadinessPolicy::Wait;
    let pool = Arc::new(SqliteWorkerPool::new(NonZeroU32::new(1).unwrap()));
    let dataset = Dataset::open(options, pool, Installer::new(upstream)).await.unwrap();

    let lore = dataset.get_lore(42).await.unwrap().unwrap();
    assert_eq!(lore["displayProperties"]["name"], "Ghost Fragment");
    assert_eq!(dataset.current_file().as_deref(), Some(FILE));
}

#[tokio::test]
async fn test_dataset_without_a_grimoire_table() {
    let data = TempDir::new().unwrap();
    let categories: Vec<Category> =
        Category::ALL.into_iter().filter(|category| *category != Category::GrimoireCards).collect();
    content_database(&data.path().join(FILE), &categories).await;

    let upstream = Arc::new(StaticUpstream {
        manifest: FetchedManifest {
            manifest: Manifest::default(),
            last_modified: datetime!(2024-05-10 17:30 UTC),
            max_age: 0,
        },
        packages: HashMap::new(),
    });
    let mut options = DatasetOptions::new("d2", data.path(), "https://www.bungie.net");
    options.readiness = ReadinessPolicy::Wait;
    options.categories = categories;
    let pool = Arc::new(SqliteWorkerPool::new(NonZeroU32::new(1).unwrap()));
    let dataset = Dataset::open(options, pool, Installer::new(upstream)).await.unwrap();

    assert!(dataset.get_lore(42).await.unwrap().is_some());
    assert!(dataset.get_grimoire_cards(5).await.unwrap().is_empty());
    assert_eq!(dataset.state(), DatasetState::Ready);
}
