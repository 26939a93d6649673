// src/cache/redis.rs
// Redis backend with silent degradation to all-miss mode

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tracing::{debug, warn};

use super::CacheBackend;

/// Shared-across-processes backend. Any backend error is logged at warn and
/// treated as a miss (reads) or a discard (writes); callers never see it.
pub struct RedisBackend {
    conn: ConnectionManager,
}

impl RedisBackend {
    /// Connect with automatic reconnection handled by the manager.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;

        debug!("Connected cache backend at {}", url);
        Ok(Self { conn })
    }

    fn ttl_millis(ttl: Duration) -> u64 {
        // Redis rejects PX 0; clamp to the minimum expiry it accepts.
        (ttl.as_millis() as u64).max(1)
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut conn = self.conn.clone();

        match redis::cmd("GET")
            .arg(key)
            .query_async::<Option<Vec<u8>>>(&mut conn)
            .await
        {
            Ok(value) => value,
            Err(e) => {
                warn!(key, "Cache read failed, treating as miss: {}", e);
                None
            }
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        let mut conn = self.conn.clone();

        let result = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(Self::ttl_millis(ttl))
            .query_async::<()>(&mut conn)
            .await;

        if let Err(e) = result {
            warn!(key, "Cache write failed, discarding: {}", e);
        }
    }

    async fn put_if_absent(&self, key: &str, value: Vec<u8>, ttl: Duration) -> bool {
        let mut conn = self.conn.clone();

        match redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(Self::ttl_millis(ttl))
            .query_async::<Option<String>>(&mut conn)
            .await
        {
            Ok(reply) => reply.is_some(),
            Err(e) => {
                // An unreachable backend must not be mistaken for holding
                // the lock.
                warn!(key, "Conditional cache write failed: {}", e);
                false
            }
        }
    }

    async fn invalidate(&self, key: &str) {
        let mut conn = self.conn.clone();

        if let Err(e) = redis::cmd("DEL").arg(key).query_async::<()>(&mut conn).await {
            warn!(key, "Cache invalidation failed: {}", e);
        }
    }

    async fn healthy(&self) -> bool {
        let mut conn = self.conn.clone();

        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .is_ok()
    }
}
