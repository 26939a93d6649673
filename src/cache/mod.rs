// src/cache/mod.rs

//! Keyed, TTL'd blob store shared by every component of the core.
//!
//! Reads are best-effort and never a correctness dependency: a miss, an
//! expired entry, and an unreachable backend all look the same to callers.
//! Writes are fire-and-forget. Concurrent writers for the same key are
//! last-writer-wins; key derivation (see `keys`) folds in every input that
//! affects the payload, so races produce byte-equal values.

pub mod keys;
pub mod memory;
pub mod redis;

pub use self::memory::MemoryBackend;
pub use self::redis::RedisBackend;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::metrics;

/// Cache namespaces. Each maps to a distinct key prefix in the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    LmResponse,
    Answer,
    Schema,
    Suggestion,
    Session,
    Result,
    Lock,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::LmResponse => "lm_response",
            Namespace::Answer => "answer",
            Namespace::Schema => "schema",
            Namespace::Suggestion => "suggestion",
            Namespace::Session => "session",
            Namespace::Result => "result",
            Namespace::Lock => "lock",
        }
    }

    /// Render the full backend key. Sessions, results, and locks get their
    /// own top-level prefixes; everything else lives under `cache:`.
    fn render(&self, key: &str) -> String {
        match self {
            Namespace::Session => format!("session:{}", key),
            Namespace::Result => format!("result:{}", key),
            Namespace::Lock => format!("lock:{}", key),
            _ => format!("cache:{}:{}", self.as_str(), key),
        }
    }
}

/// Storage backend contract. Implementations swallow their own errors and
/// degrade to all-miss, all-discard behavior.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Option<Vec<u8>>;

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration);

    /// Store only if the key is absent. Returns true when this caller won.
    async fn put_if_absent(&self, key: &str, value: Vec<u8>, ttl: Duration) -> bool;

    async fn invalidate(&self, key: &str);

    async fn healthy(&self) -> bool;
}

/// Namespaced facade over a backend; the only cache type components hold.
#[derive(Clone)]
pub struct Cache {
    backend: Arc<dyn CacheBackend>,
}

impl Cache {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    /// In-process cache, used when no REDIS_URL is configured and by tests.
    pub fn in_memory(max_entries: u64) -> Self {
        Self::new(Arc::new(MemoryBackend::new(max_entries)))
    }

    pub async fn get(&self, ns: Namespace, key: &str) -> Option<Vec<u8>> {
        let value = self.backend.get(&ns.render(key)).await;
        metrics::record_cache_result(ns.as_str(), value.is_some());
        value
    }

    pub async fn put(&self, ns: Namespace, key: &str, value: Vec<u8>, ttl: Duration) {
        self.backend.put(&ns.render(key), value, ttl).await;
    }

    pub async fn invalidate(&self, ns: Namespace, key: &str) {
        self.backend.invalidate(&ns.render(key)).await;
    }

    /// Advisory lock used for scheduler election. Held until the lease
    /// expires; there is no unlock.
    pub async fn try_lock(&self, name: &str, lease: Duration) -> bool {
        self.backend
            .put_if_absent(&Namespace::Lock.render(name), b"1".to_vec(), lease)
            .await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, ns: Namespace, key: &str) -> Option<T> {
        let bytes = self.get(ns, key).await?;

        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(namespace = ns.as_str(), key, "Discarding undecodable cache entry: {}", e);
                self.invalidate(ns, key).await;
                None
            }
        }
    }

    pub async fn put_json<T: Serialize>(&self, ns: Namespace, key: &str, value: &T, ttl: Duration) {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.put(ns, key, bytes, ttl).await,
            Err(e) => warn!(namespace = ns.as_str(), key, "Failed to encode cache value: {}", e),
        }
    }

    pub async fn healthy(&self) -> bool {
        self.backend.healthy().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_rendering() {
        assert_eq!(Namespace::Session.render("abc"), "session:abc");
        assert_eq!(Namespace::Result.render("j1"), "result:j1");
        assert_eq!(Namespace::Lock.render("scheduler"), "lock:scheduler");
        assert_eq!(Namespace::Answer.render("deadbeef"), "cache:answer:deadbeef");
        assert_eq!(Namespace::Schema.render("users"), "cache:schema:users");
    }

    #[tokio::test]
    async fn test_round_trip_and_invalidate() {
        let cache = Cache::in_memory(100);

        cache
            .put(Namespace::Answer, "k", b"payload".to_vec(), Duration::from_secs(60))
            .await;
        assert_eq!(cache.get(Namespace::Answer, "k").await.unwrap(), b"payload");

        // Same key under another namespace is a distinct entry
        assert!(cache.get(Namespace::Schema, "k").await.is_none());

        cache.invalidate(Namespace::Answer, "k").await;
        assert!(cache.get(Namespace::Answer, "k").await.is_none());
    }

    #[tokio::test]
    async fn test_try_lock_is_exclusive() {
        let cache = Cache::in_memory(100);

        assert!(cache.try_lock("scheduler", Duration::from_secs(60)).await);
        assert!(!cache.try_lock("scheduler", Duration::from_secs(60)).await);
        assert!(cache.try_lock("other", Duration::from_secs(60)).await);
    }

    #[tokio::test]
    async fn test_json_helpers() {
        let cache = Cache::in_memory(100);

        cache
            .put_json(
                Namespace::Suggestion,
                "s",
                &vec!["Top users?".to_string()],
                Duration::from_secs(60),
            )
            .await;

        let back: Vec<String> = cache.get_json(Namespace::Suggestion, "s").await.unwrap();
        assert_eq!(back, vec!["Top users?"]);
    }
}
