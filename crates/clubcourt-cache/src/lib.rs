//! Caching layer for ClubCourt
//!
//! Implements the `CacheService` trait from clubcourt-core on two backends:
//!
//! - [`RedisCache`]: shared across server instances, via a Redis ConnectionManager
//! - [`LocalCache`]: in-process map with per-entry expiry
//!
//! [`CacheBackend`] selects one of them at startup so services stay generic
//! over a single concrete type.
//!
//! # Example
//!
//! ```no_run
//! use clubcourt_cache::RedisCache;
//! use clubcourt_core::traits::CacheService;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cache = RedisCache::new("redis://127.0.0.1:6379").await?;
//!
//!     cache.set("my_key", &"my_value", 60).await?;
//!     let value: Option<String> = cache.get("my_key").await?;
//!     assert_eq!(value, Some("my_value".to_string()));
//!
//!     Ok(())
//! }
//! ```

pub mod keys;
pub mod local;

pub use local::LocalCache;

use async_trait::async_trait;
use clubcourt_core::error::AppError;
use clubcourt_core::traits::CacheService;
use redis::{aio::ConnectionManager, AsyncCommands, Client, RedisError};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Redis cache implementation with connection pooling
///
/// Wraps a Redis ConnectionManager to provide multiplexed access to Redis.
#[derive(Clone)]
pub struct RedisCache {
    manager: ConnectionManager,
}

impl RedisCache {
    /// Create a new Redis cache instance
    ///
    /// # Errors
    ///
    /// Returns `AppError::CacheConnection` if the connection fails
    pub async fn new(url: &str) -> Result<Self, AppError> {
        debug!("Connecting to Redis at {}", url);

        let client = Client::open(url).map_err(|e| {
            error!("Failed to create Redis client: {}", e);
            AppError::CacheConnection(format!("Invalid Redis URL: {}", e))
        })?;

        let manager = ConnectionManager::new(client).await.map_err(|e| {
            error!("Failed to establish Redis connection: {}", e);
            AppError::CacheConnection(format!("Connection failed: {}", e))
        })?;

        debug!("Redis connection established successfully");
        Ok(Self { manager })
    }

    /// Ping the Redis server to check connectivity
    pub async fn ping(&self) -> Result<(), AppError> {
        let mut conn = self.manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                error!("Redis ping failed: {}", e);
                AppError::Cache(format!("Ping failed: {}", e))
            })?;
        Ok(())
    }

    /// Convert RedisError to AppError
    fn map_redis_error(err: RedisError) -> AppError {
        match err.kind() {
            redis::ErrorKind::IoError => {
                error!("Redis I/O error: {}", err);
                AppError::CacheConnection(format!("I/O error: {}", err))
            }
            redis::ErrorKind::TypeError => {
                warn!("Redis type error: {}", err);
                AppError::Cache(format!("Type mismatch: {}", err))
            }
            _ => {
                error!("Redis error: {}", err);
                AppError::Cache(err.to_string())
            }
        }
    }
}

#[async_trait]
impl CacheService for RedisCache {
    async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, AppError> {
        debug!("GET {}", key);
        let mut conn = self.manager.clone();

        let result: Option<String> = conn.get(key).await.map_err(Self::map_redis_error)?;

        match result {
            Some(json) => {
                let value = serde_json::from_str::<T>(&json).map_err(|e| {
                    error!("Failed to deserialize value for key {}: {}", key, e);
                    AppError::Serialization(format!("Deserialization failed: {}", e))
                })?;
                debug!("Cache HIT: {}", key);
                Ok(Some(value))
            }
            None => {
                debug!("Cache MISS: {}", key);
                Ok(None)
            }
        }
    }

    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) -> Result<(), AppError> {
        debug!("SET {} (TTL: {}s)", key, ttl_secs);
        let mut conn = self.manager.clone();

        let json = serde_json::to_string(value).map_err(|e| {
            error!("Failed to serialize value for key {}: {}", key, e);
            AppError::Serialization(format!("Serialization failed: {}", e))
        })?;

        // SETEX rejects a zero expiry
        if ttl_secs == 0 {
            let _: i32 = conn.del(key).await.map_err(Self::map_redis_error)?;
            return Ok(());
        }

        let _: () = conn
            .set_ex(key, json, ttl_secs)
            .await
            .map_err(Self::map_redis_error)?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, AppError> {
        debug!("DEL {}", key);
        let mut conn = self.manager.clone();

        let deleted: i32 = conn.del(key).await.map_err(Self::map_redis_error)?;

        Ok(deleted > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool, AppError> {
        debug!("EXISTS {}", key);
        let mut conn = self.manager.clone();

        let exists: bool = conn.exists(key).await.map_err(Self::map_redis_error)?;

        Ok(exists)
    }
}

/// Cache backend chosen at startup
#[derive(Clone)]
pub enum CacheBackend {
    Redis(RedisCache),
    Local(Arc<LocalCache>),
}

impl CacheBackend {
    /// Connect to Redis when a URL is given, otherwise use the in-process cache
    pub async fn connect(redis_url: Option<&str>) -> Result<Self, AppError> {
        match redis_url {
            Some(url) => {
                let cache = RedisCache::new(url).await?;
                cache.ping().await?;
                info!("Using Redis cache");
                Ok(CacheBackend::Redis(cache))
            }
            None => {
                info!("No Redis URL configured, using in-process cache");
                Ok(Self::local())
            }
        }
    }

    pub fn local() -> Self {
        CacheBackend::Local(Arc::new(LocalCache::new()))
    }

    pub fn name(&self) -> &'static str {
        match self {
            CacheBackend::Redis(_) => "redis",
            CacheBackend::Local(_) => "local",
        }
    }
}

#[async_trait]
impl CacheService for CacheBackend {
    async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, AppError> {
        match self {
            CacheBackend::Redis(cache) => cache.get(key).await,
            CacheBackend::Local(cache) => cache.get(key).await,
        }
    }

    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) -> Result<(), AppError> {
        match self {
            CacheBackend::Redis(cache) => cache.set(key, value, ttl_secs).await,
            CacheBackend::Local(cache) => cache.set(key, value, ttl_secs).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, AppError> {
        match self {
            CacheBackend::Redis(cache) => cache.delete(key).await,
            CacheBackend::Local(cache) => cache.delete(key).await,
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, AppError> {
        match self {
            CacheBackend::Redis(cache) => cache.exists(key).await,
            CacheBackend::Local(cache) => cache.exists(key).await,
        }
    }
}
