// src/config/agent.rs
// Pipeline and correction-loop policy

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::helpers;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Temperature for table choice and SQL synthesis (cacheable at 0).
    pub generation_temperature: f32,
    /// Temperature for the natural-language summary.
    pub summary_temperature: f32,
    /// Temperature for follow-up suggestions.
    pub suggestion_temperature: f32,
    /// LM correction calls before the correction graph gives up.
    pub correction_max_attempts: u32,
    /// Reject anything that is not a read query before execution.
    pub read_only_enforced: bool,
    /// Per-statement execution timeout.
    pub statement_timeout_secs: u64,
    pub max_suggestions: usize,
    /// Include generated SQL in failure messages (operator debugging).
    pub expose_sql_on_error: bool,
}

impl AgentConfig {
    pub fn from_env() -> Self {
        Self {
            generation_temperature: helpers::env_f32("GENERATION_TEMPERATURE", 0.0),
            summary_temperature: helpers::env_f32("SUMMARY_TEMPERATURE", 0.3),
            suggestion_temperature: helpers::env_f32("SUGGESTION_TEMPERATURE", 0.5),
            correction_max_attempts: helpers::env_u32("CORRECTION_MAX_ATTEMPTS", 3),
            read_only_enforced: helpers::env_bool("READ_ONLY_ENFORCED", true),
            statement_timeout_secs: helpers::env_u64("STATEMENT_TIMEOUT", 20),
            max_suggestions: helpers::env_usize("MAX_SUGGESTIONS", 5),
            expose_sql_on_error: helpers::env_bool("EXPOSE_SQL_ON_ERROR", false),
        }
    }

    pub fn statement_timeout(&self) -> Duration {
        Duration::from_secs(self.statement_timeout_secs)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
