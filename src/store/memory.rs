use crate::core::cache::KeyValueCollection;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

struct CacheValue {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

/// Process-local collection, used when no data directory can be opened.
#[derive(Default)]
pub struct MemoryCollection {
    inner: Mutex<HashMap<Vec<u8>, CacheValue>>,
}

impl MemoryCollection {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueCollection for MemoryCollection {
    async fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let mut cache = self.inner.lock().await;
        let expired = match cache.get(key) {
            Some(entry) => entry.expires_at.is_some_and(|expiry| expiry < Instant::now()),
            None => {
                debug!("Cache MISS for key: {}", String::from_utf8_lossy(key));
                return None;
            }
        };
        if expired {
            debug!("Cache entry expired for key: {}", String::from_utf8_lossy(key));
            cache.remove(key);
            return None;
        }
        debug!("Cache HIT for key: {}", String::from_utf8_lossy(key));
        cache.get(key).map(|entry| entry.value.clone())
    }

    async fn put(&self, key: &[u8], value: &[u8], ttl: Option<Duration>) {
        let entry = CacheValue {
            value: value.to_vec(),
            expires_at: ttl.map(|duration| Instant::now() + duration),
        };
        let mut cache = self.inner.lock().await;
        debug!("Cache PUT for key: {}", String::from_utf8_lossy(key));
        cache.insert(key.to_vec(), entry);
    }

    async fn remove(&self, key: &[u8]) {
        let mut cache = self.inner.lock().await;
        cache.remove(key);
        debug!("Cache REMOVE for key: {}", String::from_utf8_lossy(key));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_collection_get_put() {
        let collection = MemoryCollection::new();

        assert!(collection.get(b"AAPL:2024-01-01:2024-12-31").await.is_none());

        collection
            .put(b"AAPL:2024-01-01:2024-12-31", b"[1,2,3]", None)
            .await;
        assert_eq!(
            collection.get(b"AAPL:2024-01-01:2024-12-31").await,
            Some(b"[1,2,3]".to_vec())
        );
        assert!(collection.get(b"MSFT:2024-01-01:2024-12-31").await.is_none());
    }

    #[tokio::test]
    async fn test_collection_ttl_expiration() {
        let collection = MemoryCollection::new();
        collection
            .put(b"key", b"value", Some(Duration::from_millis(10)))
            .await;
        assert_eq!(collection.get(b"key").await, Some(b"value".to_vec()));

        sleep(Duration::from_millis(20)).await;
        assert!(collection.get(b"key").await.is_none());
    }

    #[tokio::test]
    async fn test_collection_remove() {
        let collection = MemoryCollection::new();
        collection.put(b"key", b"value", None).await;
        collection.remove(b"key").await;
        assert!(collection.get(b"key").await.is_none());
    }
}
