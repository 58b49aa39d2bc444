use super::CacheStore;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Cache store shared through a Redis server.
#[derive(Debug, Clone)]
pub struct RedisStore {
    client: redis::Client,
}

impl RedisStore {
    /// Parse the connection URL. No connection is made until first use.
    pub fn open(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).or_raise(|| ErrorKind::Store)?;
        Ok(Self { client })
    }

    async fn connection(&self) -> Result<MultiplexedConnection> {
        let connect = self.client.get_multiplexed_async_connection();
        tokio::time::timeout(CONNECT_TIMEOUT, connect)
            .await
            .or_raise(|| ErrorKind::Store)?
            .or_raise(|| ErrorKind::Store)
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        conn.get(key).await.or_raise(|| ErrorKind::Store)
    }

    async fn set_ex(&self, key: &str, ttl: u64, value: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        conn.set_ex::<_, _, ()>(key, value, ttl).await.or_raise(|| ErrorKind::Store)
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>> {
        let mut conn = self.connection().await?;
        let ttl: i64 = conn.ttl(key).await.or_raise(|| ErrorKind::Store)?;
        // -2 for a missing key, -1 for a key without expiry.
        Ok(u64::try_from(ttl).ok())
    }
}
