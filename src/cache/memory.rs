// src/cache/memory.rs
// In-process backend over moka with per-entry TTL

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache as MokaCache;
use std::time::{Duration, Instant};

use super::CacheBackend;

/// Entries carry their own TTL so one cache serves every namespace.
#[derive(Clone)]
struct Entry {
    value: Vec<u8>,
    ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, entry: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// Capacity-bounded in-process cache. Used when no Redis backend is
/// configured; eviction beyond TTL is size-based (TinyLFU).
pub struct MemoryBackend {
    inner: MokaCache<String, Entry>,
}

impl MemoryBackend {
    pub fn new(max_entries: u64) -> Self {
        Self {
            inner: MokaCache::builder()
                .max_capacity(max_entries)
                .expire_after(PerEntryTtl)
                .build(),
        }
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.get(key).await.map(|entry| entry.value)
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        self.inner.insert(key.to_string(), Entry { value, ttl }).await;
    }

    async fn put_if_absent(&self, key: &str, value: Vec<u8>, ttl: Duration) -> bool {
        self.inner
            .entry(key.to_string())
            .or_insert(Entry { value, ttl })
            .await
            .is_fresh()
    }

    async fn invalidate(&self, key: &str) {
        self.inner.invalidate(key).await;
    }

    async fn healthy(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_entries_expire_by_their_own_ttl() {
        let backend = MemoryBackend::new(100);

        backend.put("short", b"a".to_vec(), Duration::from_millis(20)).await;
        backend.put("long", b"b".to_vec(), Duration::from_secs(60)).await;

        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(backend.get("short").await.is_none());
        assert_eq!(backend.get("long").await.unwrap(), b"b");
    }

    #[tokio::test]
    async fn test_put_if_absent_loses_to_existing() {
        let backend = MemoryBackend::new(100);

        assert!(backend.put_if_absent("k", b"first".to_vec(), Duration::from_secs(60)).await);
        assert!(!backend.put_if_absent("k", b"second".to_vec(), Duration::from_secs(60)).await);
        assert_eq!(backend.get("k").await.unwrap(), b"first");
    }
}
