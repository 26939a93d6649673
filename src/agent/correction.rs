// src/agent/correction.rs
// Bounded-retry correction state machine
//
// Start -> Analyze (LM proposes new SQL, attempt += 1) -> Execute
//   Execute success            -> Done(fixed)
//   Execute error, attempts left -> Analyze
//   Execute error, exhausted     -> Done(gave up)
//
// Local heuristics (fence stripping, empty-SQL detection, the read-only
// verb filter) transform or reject candidates without their own LM call,
// so the attempt budget counts exactly the LM correction calls.

use tracing::{debug, info, warn};

use super::{JobControl, prompts};
use crate::config::AgentConfig;
use crate::connector::{ConnectorError, QueryResult, SqlConnector};
use crate::error::CoreResult;
use crate::llm::{ChatCompleter, parse};
use crate::metrics;

/// Terminal state of the correction graph.
#[derive(Debug)]
pub enum CorrectionOutcome {
    Fixed {
        sql: String,
        result: QueryResult,
        attempts: u32,
    },
    GaveUp {
        last_sql: String,
        error: ConnectorError,
    },
}

/// Borrowed view over the agent's collaborators; the graph never mutates
/// the agent's outer state.
pub struct CorrectionGraph<'a> {
    lm: &'a dyn ChatCompleter,
    connector: &'a dyn SqlConnector,
    config: &'a AgentConfig,
}

impl<'a> CorrectionGraph<'a> {
    pub fn new(
        lm: &'a dyn ChatCompleter,
        connector: &'a dyn SqlConnector,
        config: &'a AgentConfig,
    ) -> Self {
        Self { lm, connector, config }
    }

    /// Drive the machine from an initial failing statement to Done.
    ///
    /// Returns `Err` only for LM-level failures (circuit open, exhausted
    /// retries); the graph's own give-up is a normal `GaveUp` outcome.
    pub async fn run(
        &self,
        question: &str,
        ddl_bundle: &[(String, String)],
        sql: String,
        error: ConnectorError,
        ctrl: &JobControl,
    ) -> CoreResult<CorrectionOutcome> {
        let mut last_sql = sql;
        let mut last_error = error;

        for attempt in 1..=self.config.correction_max_attempts {
            ctrl.checkpoint()?;

            debug!(attempt, error = %last_error, "Asking LM to correct SQL");

            let (system, user) =
                prompts::correct_sql(question, &last_sql, &last_error.to_string(), ddl_bundle);
            let reply = self
                .lm
                .complete(&system, &user, self.config.generation_temperature)
                .await?;

            let Some(candidate) = parse::extract_sql(&reply) else {
                warn!(attempt, "Correction produced no SQL");
                last_error = ConnectorError::Other("model returned an empty statement".into());
                continue;
            };

            if self.config.read_only_enforced && !parse::is_read_only(&candidate) {
                warn!(attempt, "Correction rejected by read-only filter");
                last_sql = candidate;
                last_error =
                    ConnectorError::Permission("statement rejected by read-only filter".into());
                continue;
            }

            ctrl.checkpoint()?;

            match self
                .connector
                .execute(&candidate, self.config.statement_timeout())
                .await
            {
                Ok(result) => {
                    info!(attempt, "Correction succeeded");
                    metrics::record_correction(true);
                    return Ok(CorrectionOutcome::Fixed {
                        sql: candidate,
                        result,
                        attempts: attempt,
                    });
                }
                Err(e) => {
                    debug!(attempt, error = %e, "Corrected SQL still failing");
                    last_sql = candidate;
                    last_error = e;
                }
            }
        }

        metrics::record_correction(false);
        Ok(CorrectionOutcome::GaveUp {
            last_sql,
            error: last_error,
        })
    }
}
