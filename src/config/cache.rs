// src/config/cache.rs
// Cache backend selection and TTL policy

use serde::{Deserialize, Serialize};

use super::helpers;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Redis backend when set; in-process moka backend otherwise.
    pub redis_url: Option<String>,
    /// TTL for completed answers in the `answer` namespace.
    pub query_cache_ttl_secs: u64,
    /// TTL for rendered DDL snapshots in the `schema` namespace.
    pub schema_cache_ttl_secs: u64,
    /// TTL for cached follow-up suggestions.
    pub suggestion_cache_ttl_secs: u64,
    /// Capacity bound for the in-process backend.
    pub memory_max_entries: u64,
}

impl CacheConfig {
    pub fn from_env() -> Self {
        Self {
            redis_url: helpers::env_opt("REDIS_URL"),
            query_cache_ttl_secs: helpers::env_u64("QUERY_CACHE_TTL", 300),
            schema_cache_ttl_secs: helpers::env_u64("SCHEMA_CACHE_TTL", 3_600),
            suggestion_cache_ttl_secs: helpers::env_u64("SUGGESTION_CACHE_TTL", 300),
            memory_max_entries: helpers::env_u64("CACHE_MAX_ENTRIES", 10_000),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
