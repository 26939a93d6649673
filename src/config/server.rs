// src/config/server.rs
// HTTP boundary configuration

use serde::{Deserialize, Serialize};

use super::helpers;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            host: helpers::env_or("HOST", "0.0.0.0"),
            port: helpers::env_u32("PORT", 8080) as u16,
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
