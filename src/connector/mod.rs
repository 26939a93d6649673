// src/connector/mod.rs
// Read-focused SQL connector boundary

pub mod postgres;

pub use postgres::PostgresConnector;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by a connector. Connection and timeout failures are
/// transient; everything else reflects the statement itself.
#[derive(Debug, Clone, Error)]
pub enum ConnectorError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("statement timed out after {0:?}")]
    Timeout(Duration),

    #[error("SQL syntax error: {0}")]
    Syntax(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("{0}")]
    Other(String),
}

impl ConnectorError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ConnectorError::Connection(_) | ConnectorError::Timeout(_))
    }
}

/// Ordered tabular result. Every row has exactly `columns.len()` scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// First `n` rows, for prompts that only need a sample.
    pub fn sample(&self, n: usize) -> QueryResult {
        QueryResult {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }
}

/// Column metadata from introspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub comment: Option<String>,
}

/// The database boundary. Statements are parameter-free; results are
/// treated as opaque scalars.
#[async_trait]
pub trait SqlConnector: Send + Sync {
    async fn execute(&self, sql: &str, timeout: Duration) -> Result<QueryResult, ConnectorError>;

    async fn list_tables(&self) -> Result<Vec<String>, ConnectorError>;

    async fn describe_table(&self, table: &str) -> Result<Vec<ColumnInfo>, ConnectorError>;

    async fn healthy(&self) -> bool {
        self.list_tables().await.is_ok()
    }
}
