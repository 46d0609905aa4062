//! Redis implementation of [`CacheStore`] on a deadpool connection pool.

use std::time::Duration;

use deadpool_redis::redis::{self, AsyncCommands};
use deadpool_redis::{Config as RedisConfig, Connection, Pool, PoolConfig, Runtime};

use super::{CacheError, CacheStore};
use crate::config::CacheConfig;

#[derive(Clone)]
pub struct RedisCache {
    pool: Pool,
}

impl RedisCache {
    /// Build the pool. No connection is made until first use.
    pub fn new(config: &CacheConfig) -> anyhow::Result<Self> {
        let mut redis_config = RedisConfig::from_url(config.url.clone());
        let mut pool_config = PoolConfig::new(config.pool_size);
        pool_config.timeouts.wait = Some(config.acquire_timeout);
        pool_config.timeouts.create = Some(config.acquire_timeout);
        redis_config.pool = Some(pool_config);

        let pool = redis_config.create_pool(Some(Runtime::Tokio1))?;
        Ok(Self { pool })
    }

    /// Round-trip a PING, used at startup to report cache reachability.
    pub async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.conn().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await.map_err(command)?;
        Ok(())
    }

    async fn conn(&self) -> Result<Connection, CacheError> {
        self.pool.get().await.map_err(|e| CacheError::Unavailable(e.to_string()))
    }
}

fn command(err: redis::RedisError) -> CacheError {
    CacheError::Command(err.to_string())
}

#[async_trait::async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn().await?;
        conn.get::<_, Option<String>>(key).await.map_err(command)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn().await?;
        // SETEX rejects a zero expiry
        let seconds = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, seconds).await.map_err(command)
    }

    async fn del(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn().await?;
        conn.del::<_, i64>(key).await.map(|_| ()).map_err(command)
    }

    async fn incr(&self, key: &str) -> Result<i64, CacheError> {
        let mut conn = self.conn().await?;
        conn.incr::<_, _, i64>(key, 1).await.map_err(command)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn().await?;
        let seconds = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX).max(1);
        conn.expire::<_, ()>(key, seconds).await.map_err(command)
    }

    async fn ttl(&self, key: &str) -> Result<i64, CacheError> {
        let mut conn = self.conn().await?;
        conn.ttl::<_, i64>(key).await.map_err(command)
    }
}
