// src/dispatch/types.rs
// Job and result-record types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::AnswerPayload;
use crate::error::ErrorKind;

/// Which worker pool a job runs in. Pools differ only in sizing and time
/// limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolKind {
    Simple,
    Standard,
    Complex,
}

impl PoolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolKind::Simple => "simple",
            PoolKind::Standard => "standard",
            PoolKind::Complex => "complex",
        }
    }
}

/// One unit of user work. Owned by the queue, then exclusively by a worker,
/// then represented only by its result record.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub question: String,
    pub session_id: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub pool: PoolKind,
    /// Re-enqueue count; 0 on first submission.
    pub attempt: u32,
}

/// The state machine record for a job, persisted in the result store.
/// Exactly one variant at any observation; terminal variants are immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ResultRecord {
    Queued {
        submitted_at: DateTime<Utc>,
    },
    Running {
        started_at: DateTime<Utc>,
    },
    Succeeded {
        payload: AnswerPayload,
        finished_at: DateTime<Utc>,
    },
    Failed {
        kind: ErrorKind,
        message: String,
        finished_at: DateTime<Utc>,
    },
    Cancelled {
        finished_at: DateTime<Utc>,
    },
}

impl ResultRecord {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ResultRecord::Succeeded { .. } | ResultRecord::Failed { .. } | ResultRecord::Cancelled { .. }
        )
    }

    pub fn state_name(&self) -> &'static str {
        match self {
            ResultRecord::Queued { .. } => "queued",
            ResultRecord::Running { .. } => "running",
            ResultRecord::Succeeded { .. } => "succeeded",
            ResultRecord::Failed { .. } => "failed",
            ResultRecord::Cancelled { .. } => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_split() {
        let queued = ResultRecord::Queued { submitted_at: Utc::now() };
        let running = ResultRecord::Running { started_at: Utc::now() };
        let cancelled = ResultRecord::Cancelled { finished_at: Utc::now() };

        assert!(!queued.is_terminal());
        assert!(!running.is_terminal());
        assert!(cancelled.is_terminal());
    }

    #[test]
    fn test_record_serializes_with_state_tag() {
        let record = ResultRecord::Failed {
            kind: ErrorKind::Timeout,
            message: "hard time limit exceeded".into(),
            finished_at: Utc::now(),
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["state"], "failed");
        assert_eq!(value["kind"], "timeout");
    }
}
