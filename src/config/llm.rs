// src/config/llm.rs
// Language-model endpoint configuration (LiteLLM-compatible chat completions)

use serde::{Deserialize, Serialize};

use super::helpers;

/// Client-side policy for the external chat-completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub api_base: String,
    /// Full `Authorization` header value, e.g. "Bearer sk-...".
    pub auth_header: String,
    pub model: String,
    /// Outbound calls per minute across the whole process.
    pub rate_limit_per_minute: u32,
    /// Consecutive failures before the circuit opens.
    pub breaker_failure_threshold: u32,
    /// Cooldown before the open circuit admits a single probe.
    pub breaker_cooldown_secs: u64,
    pub retry_max_attempts: u32,
    pub retry_base_ms: u64,
    pub retry_cap_ms: u64,
    /// Per-call deadline; the call is hard-cancelled on expiry.
    pub call_deadline_secs: u64,
    /// Response caching applies to temperature-0 calls only; higher
    /// temperatures always bypass the cache.
    pub enable_cache: bool,
    pub cache_ttl_secs: u64,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self {
            api_base: helpers::env_or("LITELLM_API_BASE", "http://localhost:4000"),
            auth_header: helpers::env_or("LITELLM_AUTH_HEADER", ""),
            model: helpers::env_or("LITELLM_MODEL", "gpt-4o-mini"),
            rate_limit_per_minute: helpers::env_u32("API_RATE_LIMIT", 60),
            breaker_failure_threshold: helpers::env_u32("LLM_BREAKER_FAILURES", 5),
            breaker_cooldown_secs: helpers::env_u64("LLM_BREAKER_COOLDOWN", 30),
            retry_max_attempts: helpers::env_u32("LLM_RETRY_MAX_ATTEMPTS", 3),
            retry_base_ms: helpers::env_u64("LLM_RETRY_BASE_MS", 500),
            retry_cap_ms: helpers::env_u64("LLM_RETRY_CAP_MS", 8_000),
            call_deadline_secs: helpers::env_u64("LLM_CALL_DEADLINE", 15),
            enable_cache: helpers::env_bool("ENABLE_LLM_CACHE", true),
            cache_ttl_secs: helpers::env_u64("LLM_CACHE_TTL", 300),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_base.is_empty() {
            return Err(anyhow::anyhow!("LITELLM_API_BASE must not be empty"));
        }

        if self.rate_limit_per_minute == 0 {
            return Err(anyhow::anyhow!("API_RATE_LIMIT must be at least 1"));
        }

        if self.breaker_failure_threshold == 0 {
            return Err(anyhow::anyhow!("LLM_BREAKER_FAILURES must be at least 1"));
        }

        Ok(())
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
