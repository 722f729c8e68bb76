//! In-process TTL cache
//!
//! Stores serialized values in a `parking_lot` guarded map. Expired entries
//! are evicted on the next write. Used when no Redis URL is configured and by
//! service tests.

use async_trait::async_trait;
use clubcourt_core::{error::AppError, traits::CacheService};
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, error};

struct Entry {
    json: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// In-memory cache with per-entry expiry
#[derive(Default)]
pub struct LocalCache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl LocalCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, including expired ones not yet evicted
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheService for LocalCache {
    async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, AppError> {
        let now = Instant::now();
        let json = {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if entry.is_live(now) => Some(entry.json.clone()),
                _ => None,
            }
        };

        match json {
            Some(json) => {
                let value = serde_json::from_str::<T>(&json).map_err(|e| {
                    error!("Failed to deserialize value for key {}: {}", key, e);
                    AppError::Serialization(format!("Deserialization failed: {}", e))
                })?;
                debug!("Local cache HIT: {}", key);
                Ok(Some(value))
            }
            None => {
                debug!("Local cache MISS: {}", key);
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
        let json = serde_json::to_string(value).map_err(|e| {
            error!("Failed to serialize value for key {}: {}", key, e);
            AppError::Serialization(format!("Serialization failed: {}", e))
        })?;

        let now = Instant::now();
        let entry = Entry {
            json,
            expires_at: now + Duration::from_secs(ttl_secs),
        };

        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        if entries.len() < before {
            debug!("Evicted {} expired local cache entries", before - entries.len());
        }
        entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, AppError> {
        Ok(self.entries.write().remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool, AppError> {
        let now = Instant::now();
        Ok(self
            .entries
            .read()
            .get(key)
            .map(|entry| entry.is_live(now))
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = LocalCache::new();

        cache.set("k", &vec![1, 2, 3], 60).await.unwrap();
        let value: Option<Vec<i32>> = cache.get("k").await.unwrap();
        assert_eq!(value, Some(vec![1, 2, 3]));
        assert!(cache.exists("k").await.unwrap());

        assert!(cache.delete("k").await.unwrap());
        assert!(!cache.delete("k").await.unwrap());
        let value: Option<Vec<i32>> = cache.get("k").await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_zero_ttl_expires_immediately() {
        let cache = LocalCache::new();
        cache.set("k", &"v", 0).await.unwrap();

        let value: Option<String> = cache.get("k").await.unwrap();
        assert!(value.is_none());
        assert!(!cache.exists("k").await.unwrap());
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_write_evicts_expired_entries() {
        let cache = LocalCache::new();
        cache.set("stale", &"v", 0).await.unwrap();
        cache.set("other", &"v", 0).await.unwrap();
        assert_eq!(cache.len(), 1);

        cache.set("fresh", &"v", 60).await.unwrap();
        assert_eq!(cache.len(), 1);
        assert!(cache.exists("fresh").await.unwrap());

        assert!(cache.delete("fresh").await.unwrap());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_type_mismatch_is_serialization_error() {
        let cache = LocalCache::new();
        cache.set("k", &"text", 60).await.unwrap();

        let result: Result<Option<u64>, _> = cache.get("k").await;
        assert!(matches!(result, Err(AppError::Serialization(_))));
    }
}
