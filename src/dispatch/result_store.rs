// src/dispatch/result_store.rs
// Key-addressed storage for job results, readable while the job runs

use std::time::Duration;
use tracing::warn;

use super::types::ResultRecord;
use crate::cache::{Cache, Namespace};

/// Thin facade over the cache's `result:` namespace. TTL counts from entry
/// into a terminal state; non-terminal writes share the same TTL so an
/// orphaned record still expires.
#[derive(Clone)]
pub struct ResultStore {
    cache: Cache,
    ttl: Duration,
}

impl ResultStore {
    pub fn new(cache: Cache, ttl_secs: u64) -> Self {
        Self {
            cache,
            ttl: Duration::from_secs(ttl_secs),
        }
    }

    /// Write a state transition. Terminal records are immutable: a write
    /// over an existing terminal record is dropped.
    pub async fn put(&self, job_id: &str, record: &ResultRecord) {
        if let Some(existing) = self.get(job_id).await {
            if existing.is_terminal() {
                warn!(
                    job_id,
                    attempted = record.state_name(),
                    existing = existing.state_name(),
                    "Dropping write over terminal result record"
                );
                return;
            }
        }

        self.cache
            .put_json(Namespace::Result, job_id, record, self.ttl)
            .await;
    }

    pub async fn get(&self, job_id: &str) -> Option<ResultRecord> {
        self.cache.get_json(Namespace::Result, job_id).await
    }

    pub async fn remove(&self, job_id: &str) {
        self.cache.invalidate(Namespace::Result, job_id).await;
    }
}
