//! Read-through entity cache.
//!
//! Single-entity reads go through [`CacheGate::get_or_load`], which serves the JSON copy
//! stored under `"<entity>:<id>"` when present and otherwise loads from the database and
//! stores the result with the configured TTL. Writes call [`CacheGate::invalidate`] after
//! the database change has committed. List queries are never cached.
//!
//! The cache is strictly an optimisation: every cache failure degrades to a direct
//! database read, and a failed invalidation is logged and tolerated.

pub mod redis;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::types::{CarId, UserId};

pub use self::redis::RedisCache;

#[derive(Error, Debug)]
pub enum CacheError {
    /// No connection could be obtained
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    /// The cache rejected or failed a command
    #[error("cache command failed: {0}")]
    Command(String),
}

/// Outcome of a cache lookup, recorded in traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
    /// Caching disabled for this deployment
    Bypass,
    /// Cache failed; the value came from the database
    Error,
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CacheStatus::Hit => "hit",
            CacheStatus::Miss => "miss",
            CacheStatus::Bypass => "bypass",
            CacheStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Key-value operations needed by the entity cache and the rate limiter.
#[async_trait::async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Deleting an absent key succeeds.
    async fn del(&self, key: &str) -> Result<(), CacheError>;

    /// Increment an integer counter, creating it at 1.
    async fn incr(&self, key: &str) -> Result<i64, CacheError>;

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Remaining time to live in seconds; negative when the key is missing or has no expiry.
    async fn ttl(&self, key: &str) -> Result<i64, CacheError>;
}

pub fn user_key(id: &UserId) -> String {
    format!("user:{id}")
}

pub fn car_key(id: &CarId) -> String {
    format!("car:{id}")
}

/// Cache-aside wrapper used by the entity services.
#[derive(Clone)]
pub struct CacheGate {
    store: Option<Arc<dyn CacheStore>>,
    ttl: Duration,
}

impl CacheGate {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store: Some(store), ttl }
    }

    /// A gate that always goes straight to the loader.
    pub fn disabled() -> Self {
        Self {
            store: None,
            ttl: Duration::ZERO,
        }
    }

    /// Serve `key` from the cache, falling back to `load` on a miss or any cache failure.
    ///
    /// Loaded values are stored best effort; `None` (not found) is never cached. An entry
    /// that fails to decode is overwritten by the freshly loaded value.
    pub async fn get_or_load<T, E, F, Fut>(&self, key: &str, load: F) -> Result<Option<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        let Some(store) = &self.store else {
            tracing::trace!(key, cache = %CacheStatus::Bypass, "cache lookup");
            return load().await;
        };

        let status = match store.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str::<T>(&raw) {
                Ok(value) => {
                    tracing::debug!(key, cache = %CacheStatus::Hit, "cache lookup");
                    return Ok(Some(value));
                }
                Err(e) => {
                    tracing::warn!(key, error = %e, "Discarding undecodable cache entry");
                    CacheStatus::Miss
                }
            },
            Ok(None) => CacheStatus::Miss,
            Err(e) => {
                tracing::warn!(key, error = %e, "Cache read failed, falling back to database");
                CacheStatus::Error
            }
        };
        tracing::debug!(key, cache = %status, "cache lookup");

        let loaded = load().await?;
        if let Some(value) = &loaded {
            self.populate(store.as_ref(), key, value).await;
        }

        Ok(loaded)
    }

    /// Load `key` from the source of truth without consulting the cache, then overwrite the
    /// cached entry best effort.
    ///
    /// Used after a committed write: whatever the cache holds at this point is stale, and may
    /// still be there if the preceding invalidation failed.
    pub async fn refresh<T, E, F, Fut>(&self, key: &str, load: F) -> Result<Option<T>, E>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        let loaded = load().await?;
        if let (Some(store), Some(value)) = (&self.store, &loaded) {
            self.populate(store.as_ref(), key, value).await;
        }
        Ok(loaded)
    }

    async fn populate<T: Serialize>(&self, store: &dyn CacheStore, key: &str, value: &T) {
        match serde_json::to_string(value) {
            Ok(raw) => {
                if let Err(e) = store.set_ex(key, &raw, self.ttl).await {
                    tracing::warn!(key, error = %e, "Failed to populate cache");
                }
            }
            Err(e) => tracing::warn!(key, error = %e, "Failed to encode cache entry"),
        }
    }

    /// Drop `key` from the cache. Absent keys count as success.
    pub async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        match &self.store {
            Some(store) => store.del(key).await,
            None => Ok(()),
        }
    }

    /// Invalidate and log on failure; the write that preceded it has already committed.
    pub async fn invalidate_logged(&self, key: &str) {
        if let Err(e) = self.invalidate(key).await {
            tracing::warn!(key, error = %e, "Cache invalidation failed, entry may be stale until it expires");
        }
    }
}
