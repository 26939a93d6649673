// src/error.rs
// Error taxonomy for the query-processing core

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::connector::ConnectorError;

/// Machine-readable error kinds surfaced across the poll boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    Overloaded,
    UnknownJob,
    NoRelevantTables,
    SqlSynthesisFailed,
    SqlExecutionFailed,
    LmUnavailable,
    Timeout,
    /// Internal only — surfaced as the `cancelled` job state, never as a
    /// failed error.
    Cancelled,
    InternalError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Overloaded => "overloaded",
            ErrorKind::UnknownJob => "unknown_job",
            ErrorKind::NoRelevantTables => "no_relevant_tables",
            ErrorKind::SqlSynthesisFailed => "sql_synthesis_failed",
            ErrorKind::SqlExecutionFailed => "sql_execution_failed",
            ErrorKind::LmUnavailable => "lm_unavailable",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::InternalError => "internal_error",
        }
    }

    /// Short human sentence shown to the end user for this kind.
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "The question was empty or too long.",
            ErrorKind::Overloaded => "The service is busy right now, please retry shortly.",
            ErrorKind::UnknownJob => "That request is unknown or has expired.",
            ErrorKind::NoRelevantTables => "I'm not sure which data this refers to.",
            ErrorKind::SqlSynthesisFailed => "I couldn't turn that question into a query.",
            ErrorKind::SqlExecutionFailed => "The generated query kept failing against the database.",
            ErrorKind::LmUnavailable => "The language model is temporarily unavailable.",
            ErrorKind::Timeout => "The request took too long and was stopped.",
            ErrorKind::Cancelled => "The request was cancelled.",
            ErrorKind::InternalError => "Something went wrong on our side.",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error value that flows up through stage boundaries as data.
///
/// `transient` marks failures the dispatcher may retry with backoff
/// (connector resets, LM probe contention). Terminal classification happens
/// once, at the worker, after retries are exhausted.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct CoreError {
    pub kind: ErrorKind,
    pub message: String,
    pub transient: bool,
}

impl CoreError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            transient: false,
        }
    }

    pub fn transient(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            transient: true,
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalError, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }
}

impl From<ConnectorError> for CoreError {
    fn from(err: ConnectorError) -> Self {
        let transient = err.is_transient();
        Self {
            kind: ErrorKind::SqlExecutionFailed,
            message: err.to_string(),
            transient,
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(format!("serialization error: {}", err))
    }
}

/// Convenience result alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trips_through_serde() {
        let json = serde_json::to_string(&ErrorKind::NoRelevantTables).unwrap();
        assert_eq!(json, "\"no_relevant_tables\"");

        let back: ErrorKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ErrorKind::NoRelevantTables);
    }

    #[test]
    fn test_connector_transiency_carries_over() {
        let err: CoreError = ConnectorError::Connection("reset by peer".into()).into();
        assert!(err.transient);
        assert_eq!(err.kind, ErrorKind::SqlExecutionFailed);

        let err: CoreError = ConnectorError::Syntax("bad token".into()).into();
        assert!(!err.transient);
    }
}
