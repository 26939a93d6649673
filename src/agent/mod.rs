// src/agent/mod.rs
// The SQL agent: six-stage pipeline plus the correction state machine

pub mod correction;
pub mod pipeline;
pub mod prompts;
pub mod viz;

pub use correction::{CorrectionGraph, CorrectionOutcome};
pub use pipeline::SqlAgent;
pub use viz::{VizKind, VizRecommendation, recommend_visualization};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::connector::QueryResult;
use crate::error::{CoreError, CoreResult};

/// Why a running job was asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCause {
    /// Soft time limit tripped; finish up and commit nothing further.
    SoftTimeLimit,
    /// Caller cancelled the job.
    UserRequest,
}

/// Cooperative cancellation flag for one job. The pipeline checks it at
/// every stage boundary and before blocking I/O.
#[derive(Clone, Default)]
pub struct JobControl {
    token: CancellationToken,
    cause: std::sync::Arc<Mutex<Option<CancelCause>>>,
}

impl JobControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. The first cause wins.
    pub fn cancel(&self, cause: CancelCause) {
        let mut slot = self.cause.lock();
        if slot.is_none() {
            *slot = Some(cause);
        }
        drop(slot);
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn cause(&self) -> Option<CancelCause> {
        *self.cause.lock()
    }

    /// Stage-boundary check: unwind with the matching error when cancelled.
    pub fn checkpoint(&self) -> CoreResult<()> {
        if !self.token.is_cancelled() {
            return Ok(());
        }

        match self.cause() {
            Some(CancelCause::UserRequest) => Err(CoreError::cancelled("job cancelled by caller")),
            _ => Err(CoreError::timeout("soft time limit reached")),
        }
    }
}

/// The complete product of a successful pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerPayload {
    pub sql: String,
    pub summary: String,
    pub table: QueryResult,
    pub suggestions: Vec<String>,
    pub correction_applied: bool,
}
