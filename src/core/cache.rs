use async_trait::async_trait;
use std::time::Duration;

/// A named byte-oriented collection with optional expiry per entry.
#[async_trait]
pub trait KeyValueCollection: Send + Sync {
    async fn get(&self, key: &[u8]) -> Option<Vec<u8>>;
    async fn put(&self, key: &[u8], value: &[u8], ttl: Option<Duration>);
    async fn remove(&self, key: &[u8]);
}
