//! SQLite-backed store.

use super::CacheStore;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use sqlx::SqliteConnection;
use sqlx::pool::PoolConnectionMetadata;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use time::OffsetDateTime;
use tracing::{debug, instrument};

/// Embedded migrations that are run automatically on connect.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
// Cache traffic is a handful of small reads per request.
const MAX_CONNECTIONS: u32 = 4;

/// Cache store in a local SQLite file.
///
/// Expired rows are invisible to reads immediately and physically removed by
/// [`SqliteStore::purge_expired`] (also run on [`SqliteStore::close`]).
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    async fn new(options: SqliteConnectOptions, max: Option<u32>) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            // Apply the query-based PRAGMAs to every pooled connection, not
            // just the first one.
            .after_connect(|conn, meta| Box::pin(async move { Self::apply_pragmas(conn, meta).await }))
            .max_connections(max.unwrap_or(MAX_CONNECTIONS))
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Open (or create) the cache database at the given path.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let options = Self::base_options().filename(path.as_ref()).create_if_missing(true);
        Self::new(options, None).await
    }

    /// Connect to an in-memory database.
    ///
    /// In-memory databases are per-connection, so the pool is limited to one.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = Self::base_options().filename(":memory:");
        Self::new(options, Some(1)).await
    }

    fn base_options() -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            // Several processes may share one cache file.
            .busy_timeout(std::time::Duration::from_millis(1500))
    }

    async fn apply_pragmas(conn: &mut SqliteConnection, _meta: PoolConnectionMetadata) -> sqlx::Result<()> {
        sqlx::query(
            r#"
                PRAGMA wal_autocheckpoint = 400;
                PRAGMA cache_size = -2048;
                PRAGMA temp_store = MEMORY;
            "#,
        )
        .execute(conn)
        .await?;
        Ok(())
    }

    #[instrument("performing cache migrations", skip(self))]
    async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await.or_raise(|| ErrorKind::Migration)
    }

    fn now() -> i64 {
        OffsetDateTime::now_utc().unix_timestamp()
    }

    /// Delete rows whose lifetime has elapsed. Returns how many were removed.
    pub async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query(include_str!("../../queries/purge_expired.sql"))
            .bind(Self::now())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected())
    }

    /// Close the connection pool.
    pub async fn close(&self) {
        match self.purge_expired().await {
            Ok(purged) => debug!(purged, "purged expired cache entries"),
            Err(err) => debug!(error = ?err, "could not purge expired cache entries"),
        }
        _ = sqlx::query("PRAGMA optimize").execute(&self.pool).await;
        self.pool.close().await;
    }
}

#[async_trait]
impl CacheStore for SqliteStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        sqlx::query_scalar(include_str!("../../queries/get_entry.sql"))
            .bind(key)
            .bind(Self::now())
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    async fn set_ex(&self, key: &str, ttl: u64, value: &str) -> Result<()> {
        let ttl = i64::try_from(ttl).or_raise(|| ErrorKind::InvalidData)?;
        sqlx::query(include_str!("../../queries/upsert_entry.sql"))
            .bind(key)
            .bind(value)
            .bind(Self::now().saturating_add(ttl))
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>> {
        let now = Self::now();
        let expires_at: Option<i64> = sqlx::query_scalar(include_str!("../../queries/get_expiry.sql"))
            .bind(key)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(expires_at.and_then(|at| u64::try_from(at - now).ok()))
    }
}
