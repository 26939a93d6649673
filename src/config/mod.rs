// src/config/mod.rs
// Central configuration - composes all domain configs

pub mod agent;
pub mod cache;
pub mod database;
pub mod dispatch;
pub mod helpers;
pub mod llm;
pub mod server;
pub mod session;

use serde::{Deserialize, Serialize};

pub use agent::AgentConfig;
pub use cache::CacheConfig;
pub use database::DatabaseConfig;
pub use dispatch::{DispatchConfig, PoolConfig};
pub use llm::LlmConfig;
pub use server::ServerConfig;
pub use session::SessionConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub llm: LlmConfig,
    pub cache: CacheConfig,
    pub database: DatabaseConfig,
    pub dispatch: DispatchConfig,
    pub session: SessionConfig,
    pub agent: AgentConfig,
    pub server: ServerConfig,
}

impl Config {
    pub fn from_env() -> Self {
        // Don't panic if .env doesn't exist (for production)
        dotenvy::dotenv().ok();

        Self {
            llm: LlmConfig::from_env(),
            cache: CacheConfig::from_env(),
            database: DatabaseConfig::from_env(),
            dispatch: DispatchConfig::from_env(),
            session: SessionConfig::from_env(),
            agent: AgentConfig::from_env(),
            server: ServerConfig::from_env(),
        }
    }

    /// Validate config on startup
    pub fn validate(&self) -> anyhow::Result<()> {
        self.llm.validate()?;
        self.database.validate()?;
        self.dispatch.validate()?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
