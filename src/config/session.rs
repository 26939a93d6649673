// src/config/session.rs
// Conversation memory bounds

use serde::{Deserialize, Serialize};

use super::helpers;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session TTL, refreshed on every access.
    pub ttl_secs: u64,
    /// Maximum history entries retained per session.
    pub history_limit: usize,
    /// Entries projected into LM context; clamped to history_limit.
    pub context_window: usize,
}

impl SessionConfig {
    pub fn from_env() -> Self {
        let history_limit = helpers::env_usize("HISTORY_LIMIT", 10);

        Self {
            ttl_secs: helpers::env_u64("SESSION_TTL", 86_400),
            history_limit,
            context_window: helpers::env_usize("CONTEXT_WINDOW", history_limit).min(history_limit),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
