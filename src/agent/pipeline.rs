// src/agent/pipeline.rs
// The six-stage question pipeline
//
// Stages run as a linear sequence over a passed-forward state; concurrency
// lives in the dispatcher, not here. Every stage boundary and every
// blocking call is preceded by a cancellation checkpoint.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::correction::{CorrectionGraph, CorrectionOutcome};
use super::{AnswerPayload, JobControl, prompts};
use crate::cache::{Cache, Namespace, keys};
use crate::catalog::SchemaCatalog;
use crate::config::{AgentConfig, CacheConfig, SessionConfig};
use crate::connector::{ConnectorError, QueryResult, SqlConnector};
use crate::error::{CoreError, CoreResult, ErrorKind};
use crate::llm::{ChatCompleter, parse};
use crate::session::ConversationMemory;

pub struct SqlAgent {
    lm: Arc<dyn ChatCompleter>,
    connector: Arc<dyn SqlConnector>,
    catalog: Arc<SchemaCatalog>,
    memory: ConversationMemory,
    cache: Cache,
    config: AgentConfig,
    context_window: usize,
    answer_ttl: Duration,
    suggestion_ttl: Duration,
}

impl SqlAgent {
    pub fn new(
        lm: Arc<dyn ChatCompleter>,
        connector: Arc<dyn SqlConnector>,
        catalog: Arc<SchemaCatalog>,
        memory: ConversationMemory,
        cache: Cache,
        config: AgentConfig,
        cache_config: &CacheConfig,
        session_config: &SessionConfig,
    ) -> Self {
        Self {
            lm,
            connector,
            catalog,
            memory,
            cache,
            config,
            context_window: session_config.context_window,
            answer_ttl: Duration::from_secs(cache_config.query_cache_ttl_secs),
            suggestion_ttl: Duration::from_secs(cache_config.suggestion_cache_ttl_secs),
        }
    }

    /// Run the full pipeline for one question.
    ///
    /// Errors come back as tagged values; nothing is thrown across the
    /// worker boundary.
    pub async fn answer(
        &self,
        question: &str,
        session_id: Option<&str>,
        ctrl: &JobControl,
    ) -> CoreResult<AnswerPayload> {
        // Stage 1: load conversation context
        let normalized = keys::normalize_question(question);
        if normalized.is_empty() {
            return Err(CoreError::invalid_input("question is empty"));
        }

        let history = match session_id {
            Some(session) => self.memory.recent(session, self.context_window).await,
            None => Vec::new(),
        };
        let digest = keys::history_digest(&history, &normalized);
        let context = prompts::format_context(&history);
        ctrl.checkpoint()?;

        // Stage 2: answer cache
        let answer_key = keys::answer_key(&normalized, &digest);
        if let Some(payload) = self
            .cache
            .get_json::<AnswerPayload>(Namespace::Answer, &answer_key)
            .await
        {
            debug!(key = %&answer_key[..8], "Answer served from cache");
            if let Some(session) = session_id {
                self.memory
                    .append(session, question, &payload.sql, &payload.summary)
                    .await;
            }
            return Ok(payload);
        }

        // Stage 3: choose tables
        let known = self.catalog.tables().await?;
        let (system, user) = prompts::choose_tables(question, &context, &known);
        let reply = self
            .lm
            .complete(&system, &user, self.config.generation_temperature)
            .await?;

        let chosen = parse::extract_table_names(&reply, &known);
        if chosen.is_empty() {
            return Err(CoreError::new(
                ErrorKind::NoRelevantTables,
                "table selection returned no known tables",
            ));
        }
        debug!(?chosen, "Tables selected");
        ctrl.checkpoint()?;

        // Stage 4: DDL bundle, insertion order stable
        let mut ddl_bundle = Vec::with_capacity(chosen.len());
        for table in &chosen {
            ddl_bundle.push((table.clone(), self.catalog.ddl(table).await?));
        }
        ctrl.checkpoint()?;

        // Stage 5: generate SQL (deterministic, cacheable)
        let (system, user) = prompts::generate_sql(question, &context, &ddl_bundle);
        let reply = self
            .lm
            .complete(&system, &user, self.config.generation_temperature)
            .await?;

        let sql = parse::extract_sql(&reply).ok_or_else(|| {
            CoreError::new(
                ErrorKind::SqlSynthesisFailed,
                "model produced no parseable SQL statement",
            )
        })?;
        ctrl.checkpoint()?;

        // Stage 6: execute, correcting on failure
        let (sql, table, correction_applied) =
            self.execute_with_correction(question, &ddl_bundle, sql, ctrl).await?;
        ctrl.checkpoint()?;

        // Stage 7: natural-language summary
        let (system, user) = prompts::summarize(question, &sql, &table);
        let summary = self
            .lm
            .complete(&system, &user, self.config.summary_temperature)
            .await?
            .trim()
            .to_string();
        ctrl.checkpoint()?;

        // Stage 8: follow-up suggestions (best effort)
        let suggestions = self.suggest(question, &summary).await;
        ctrl.checkpoint()?;

        // Stage 9: persist
        let payload = AnswerPayload {
            sql,
            summary,
            table,
            suggestions,
            correction_applied,
        };

        if let Some(session) = session_id {
            self.memory
                .append(session, question, &payload.sql, &payload.summary)
                .await;
        }

        self.cache
            .put_json(Namespace::Answer, &answer_key, &payload, self.answer_ttl)
            .await;

        info!(correction_applied, rows = payload.table.rows.len(), "Question answered");
        Ok(payload)
    }

    /// Stage 6: run the statement, handing non-transient failures to the
    /// correction graph. Transient connector failures propagate so the
    /// dispatcher can retry the whole job instead of burning corrections.
    async fn execute_with_correction(
        &self,
        question: &str,
        ddl_bundle: &[(String, String)],
        sql: String,
        ctrl: &JobControl,
    ) -> CoreResult<(String, QueryResult, bool)> {
        let initial = if self.config.read_only_enforced && !parse::is_read_only(&sql) {
            Err(ConnectorError::Permission(
                "statement rejected by read-only filter".into(),
            ))
        } else {
            self.connector
                .execute(&sql, self.config.statement_timeout())
                .await
        };

        let error = match initial {
            Ok(result) => return Ok((sql, result, false)),
            Err(e) if e.is_transient() => return Err(e.into()),
            Err(e) => e,
        };

        warn!(error = %error, "Generated SQL failed, entering correction");

        let graph = CorrectionGraph::new(self.lm.as_ref(), self.connector.as_ref(), &self.config);
        match graph.run(question, ddl_bundle, sql, error, ctrl).await? {
            CorrectionOutcome::Fixed { sql, result, attempts } => {
                info!(attempts, "Correction recovered the statement");
                Ok((sql, result, true))
            }
            CorrectionOutcome::GaveUp { last_sql, error } => {
                let detail = if self.config.expose_sql_on_error {
                    format!("{} (last SQL: {})", error, last_sql)
                } else {
                    error.to_string()
                };

                Err(CoreError::new(
                    ErrorKind::SqlExecutionFailed,
                    format!("correction attempts exhausted: {}", detail),
                ))
            }
        }
    }

    /// Stage 8: suggestions degrade to an empty list rather than failing
    /// an otherwise complete answer.
    async fn suggest(&self, question: &str, summary: &str) -> Vec<String> {
        let key = keys::suggestion_key(question, &keys::answer_digest(summary));

        if let Some(cached) = self
            .cache
            .get_json::<Vec<String>>(Namespace::Suggestion, &key)
            .await
        {
            return cached;
        }

        let (system, user) = prompts::suggest_followups(question, summary, self.config.max_suggestions);

        match self
            .lm
            .complete(&system, &user, self.config.suggestion_temperature)
            .await
        {
            Ok(reply) => {
                let suggestions = parse::extract_suggestions(&reply, self.config.max_suggestions);
                self.cache
                    .put_json(Namespace::Suggestion, &key, &suggestions, self.suggestion_ttl)
                    .await;
                suggestions
            }
            Err(e) => {
                warn!("Suggestion stage degraded to empty: {}", e);
                Vec::new()
            }
        }
    }
}
