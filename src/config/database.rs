// src/config/database.rs
// Read-only connector pool configuration

use serde::{Deserialize, Serialize};

use super::helpers;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
    pub max_overflow: u32,
    pub pool_timeout_secs: u64,
    /// Connections older than this are recycled.
    pub pool_recycle_secs: u64,
    /// Per-statement execution timeout.
    pub statement_timeout_secs: u64,
}

impl DatabaseConfig {
    pub fn from_env() -> Self {
        Self {
            url: helpers::env_or("DATABASE_URL", "postgres://localhost/askdb"),
            pool_size: helpers::env_u32("DB_POOL_SIZE", 20),
            max_overflow: helpers::env_u32("DB_MAX_OVERFLOW", 30),
            pool_timeout_secs: helpers::env_u64("DB_POOL_TIMEOUT", 30),
            pool_recycle_secs: helpers::env_u64("DB_POOL_RECYCLE", 1_800),
            statement_timeout_secs: helpers::env_u64("STATEMENT_TIMEOUT", 20),
        }
    }

    /// Upper bound on concurrently checked-out connections.
    pub fn max_connections(&self) -> u32 {
        self.pool_size + self.max_overflow
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.url.is_empty() {
            return Err(anyhow::anyhow!("DATABASE_URL must not be empty"));
        }

        if self.pool_size == 0 {
            return Err(anyhow::anyhow!("DB_POOL_SIZE must be at least 1"));
        }

        Ok(())
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
