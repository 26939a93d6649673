// src/testing/mock_connector.rs
// Canned-schema connector with scripted execution results

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use crate::connector::{ColumnInfo, ConnectorError, QueryResult, SqlConnector};

/// Connector stub: a fixed schema plus a queue of scripted `execute`
/// outcomes. Every executed statement is recorded for assertions.
#[derive(Default)]
pub struct MockConnector {
    tables: Vec<String>,
    columns: HashMap<String, Vec<ColumnInfo>>,
    results: Mutex<VecDeque<Result<QueryResult, ConnectorError>>>,
    executed: Mutex<Vec<String>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: &str, columns: Vec<(&str, &str, bool, Option<&str>)>) -> Self {
        self.tables.push(name.to_string());
        self.columns.insert(
            name.to_string(),
            columns
                .into_iter()
                .map(|(name, data_type, nullable, comment)| ColumnInfo {
                    name: name.to_string(),
                    data_type: data_type.to_string(),
                    nullable,
                    comment: comment.map(|c| c.to_string()),
                })
                .collect(),
        );
        self
    }

    pub fn push_result(&self, result: Result<QueryResult, ConnectorError>) {
        self.results.lock().push_back(result);
    }

    pub fn push_rows(&self, columns: Vec<&str>, rows: Vec<Vec<serde_json::Value>>) {
        self.push_result(Ok(QueryResult {
            columns: columns.into_iter().map(String::from).collect(),
            rows,
        }));
    }

    /// Statements seen by `execute`, oldest first.
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().clone()
    }
}

#[async_trait]
impl SqlConnector for MockConnector {
    async fn execute(&self, sql: &str, _timeout: Duration) -> Result<QueryResult, ConnectorError> {
        self.executed.lock().push(sql.to_string());

        self.results
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ConnectorError::Other("mock connector script exhausted".into())))
    }

    async fn list_tables(&self) -> Result<Vec<String>, ConnectorError> {
        Ok(self.tables.clone())
    }

    async fn describe_table(&self, table: &str) -> Result<Vec<ColumnInfo>, ConnectorError> {
        Ok(self.columns.get(table).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_scripted_execution_and_recording() {
        let connector = MockConnector::new().with_table(
            "users",
            vec![("id", "integer", false, Some("primary key"))],
        );
        connector.push_rows(vec!["count"], vec![vec![json!(3)]]);

        let result = connector
            .execute("SELECT COUNT(*) FROM users;", Duration::from_secs(20))
            .await
            .unwrap();

        assert_eq!(result.columns, vec!["count"]);
        assert_eq!(result.rows, vec![vec![json!(3)]]);
        assert_eq!(connector.executed(), vec!["SELECT COUNT(*) FROM users;"]);
    }

    #[tokio::test]
    async fn test_schema_round_trip() {
        let connector = MockConnector::new()
            .with_table("users", vec![("id", "integer", false, None)])
            .with_table("orders", vec![("total", "numeric", true, Some("in cents"))]);

        assert_eq!(connector.list_tables().await.unwrap(), vec!["users", "orders"]);
        let cols = connector.describe_table("orders").await.unwrap();
        assert_eq!(cols[0].comment.as_deref(), Some("in cents"));
    }
}
