//! Query-result cache, modeled as an explicit collaborator rather than
//! process-global state. The order store invalidates on every write.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::CacheConfig;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Cache operation failed: {0}")]
    OperationFailed(String),
}

#[async_trait::async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
    async fn exists(&self, key: &str) -> Result<bool, CacheError>;
    async fn clear(&self) -> Result<(), CacheError>;
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(value: String, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|d| Instant::now() + d),
        }
    }

    fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => Instant::now() > expires_at,
            None => false,
        }
    }
}

/// In-memory TTL cache.
#[derive(Debug, Clone)]
pub struct InMemoryCache {
    store: Arc<RwLock<HashMap<String, CacheEntry>>>,
    max_entries: usize,
}

impl InMemoryCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            store: Arc::new(RwLock::new(HashMap::new())),
            max_entries,
        }
    }

    fn lock_err<T>(_: T) -> CacheError {
        CacheError::OperationFailed("cache lock poisoned".to_string())
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait::async_trait]
impl CacheBackend for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let expired = {
            let store = self.store.read().map_err(Self::lock_err)?;
            match store.get(key) {
                Some(entry) if entry.is_expired() => true,
                Some(entry) => return Ok(Some(entry.value.clone())),
                None => return Ok(None),
            }
        };
        if expired {
            let mut store = self.store.write().map_err(Self::lock_err)?;
            store.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        let mut store = self.store.write().map_err(Self::lock_err)?;
        if store.len() >= self.max_entries && !store.contains_key(key) {
            store.retain(|_, entry| !entry.is_expired());
            if store.len() >= self.max_entries {
                // Best-effort cache: dropping everything is cheaper than
                // tracking recency.
                store.clear();
            }
        }
        store.insert(key.to_string(), CacheEntry::new(value.to_string(), ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut store = self.store.write().map_err(Self::lock_err)?;
        store.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let store = self.store.read().map_err(Self::lock_err)?;
        Ok(store.get(key).is_some_and(|entry| !entry.is_expired()))
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let mut store = self.store.write().map_err(Self::lock_err)?;
        store.clear();
        Ok(())
    }
}

/// Builds the configured cache backend. Returns `None` when caching is
/// disabled so callers can skip the decorator entirely.
pub fn build_cache(config: &CacheConfig) -> Option<Arc<dyn CacheBackend>> {
    if !config.enabled {
        return None;
    }
    Some(Arc::new(InMemoryCache::new(config.max_entries)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_delete() {
        let cache = InMemoryCache::new(10);
        cache.set("k", "v", None).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some("v".to_string()));
        assert!(cache.exists("k").await.unwrap());

        cache.delete("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn entries_expire() {
        let cache = InMemoryCache::new(10);
        cache
            .set("k", "v", Some(Duration::from_millis(5)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(!cache.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn clear_empties_the_store() {
        let cache = InMemoryCache::new(10);
        cache.set("a", "1", None).await.unwrap();
        cache.set("b", "2", None).await.unwrap();
        cache.clear().await.unwrap();
        assert_eq!(cache.get("a").await.unwrap(), None);
        assert_eq!(cache.get("b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn capacity_overflow_drops_entries_instead_of_growing() {
        let cache = InMemoryCache::new(2);
        cache.set("a", "1", None).await.unwrap();
        cache.set("b", "2", None).await.unwrap();
        cache.set("c", "3", None).await.unwrap();
        assert_eq!(cache.get("c").await.unwrap(), Some("3".to_string()));
    }
}
