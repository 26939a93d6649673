// src/config/dispatch.rs
// Worker-pool dispatcher tuning

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::helpers;

/// Per-pool sizing and time limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    pub workers: usize,
    pub soft_limit_secs: u64,
    pub hard_limit_secs: u64,
}

impl PoolConfig {
    pub fn soft_limit(&self) -> Duration {
        Duration::from_secs(self.soft_limit_secs)
    }

    pub fn hard_limit(&self) -> Duration {
        Duration::from_secs(self.hard_limit_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    pub simple: PoolConfig,
    pub standard: PoolConfig,
    pub complex: PoolConfig,
    /// Queue capacity per pool = workers * prefetch_multiplier.
    pub prefetch_multiplier: usize,
    /// Worker recycles after this many jobs; 0 disables recycling.
    pub max_tasks_per_child: usize,
    pub max_retries: u32,
    pub retry_base_ms: u64,
    /// Route jobs through the LM classifier; otherwise everything goes to
    /// the standard pool via the local heuristic.
    pub classifier_enabled: bool,
    pub max_question_bytes: usize,
    /// Result-record TTL, counted from entry into a terminal state.
    pub result_ttl_secs: u64,
}

impl DispatchConfig {
    pub fn from_env() -> Self {
        let workers = helpers::env_usize("WORKER_POOL_SIZE", 4);
        let soft = helpers::env_u64("TASK_SOFT_TIME_LIMIT", 50);
        let hard = helpers::env_u64("TASK_TIME_LIMIT", 60);

        Self {
            simple: PoolConfig {
                workers: helpers::env_usize("WORKER_POOL_SIZE_SIMPLE", workers),
                soft_limit_secs: helpers::env_u64("TASK_SOFT_TIME_LIMIT_SIMPLE", soft.div_ceil(2)),
                hard_limit_secs: helpers::env_u64("TASK_TIME_LIMIT_SIMPLE", hard.div_ceil(2)),
            },
            standard: PoolConfig {
                workers,
                soft_limit_secs: soft,
                hard_limit_secs: hard,
            },
            complex: PoolConfig {
                workers: helpers::env_usize("WORKER_POOL_SIZE_COMPLEX", workers),
                soft_limit_secs: helpers::env_u64("TASK_SOFT_TIME_LIMIT_COMPLEX", soft * 2),
                hard_limit_secs: helpers::env_u64("TASK_TIME_LIMIT_COMPLEX", hard * 2),
            },
            prefetch_multiplier: helpers::env_usize("WORKER_PREFETCH_MULTIPLIER", 4),
            max_tasks_per_child: helpers::env_usize("WORKER_MAX_TASKS_PER_CHILD", 0),
            max_retries: helpers::env_u32("TASK_MAX_RETRIES", 3),
            retry_base_ms: helpers::env_u64("TASK_RETRY_BASE_MS", 1_000),
            classifier_enabled: helpers::env_bool("POOL_CLASSIFIER_ENABLED", false),
            max_question_bytes: helpers::env_usize("MAX_QUESTION_BYTES", 4_096),
            result_ttl_secs: helpers::env_u64("RESULT_TTL", 3_600),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, pool) in [
            ("simple", &self.simple),
            ("standard", &self.standard),
            ("complex", &self.complex),
        ] {
            if pool.workers == 0 {
                return Err(anyhow::anyhow!("{} pool must have at least 1 worker", name));
            }

            if pool.soft_limit_secs > pool.hard_limit_secs {
                return Err(anyhow::anyhow!(
                    "{} pool soft limit ({}s) exceeds hard limit ({}s)",
                    name,
                    pool.soft_limit_secs,
                    pool.hard_limit_secs
                ));
            }
        }

        Ok(())
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
