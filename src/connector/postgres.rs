// src/connector/postgres.rs
// Postgres connector over a shared sqlx pool

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Column, PgPool, Row, TypeInfo};
use std::time::Duration;
use tracing::{debug, warn};

use super::{ColumnInfo, ConnectorError, QueryResult, SqlConnector};
use crate::config::DatabaseConfig;

/// Read-only Postgres endpoint. Checkouts are scoped to one statement; the
/// pool is shared between workers and the schema catalog.
pub struct PostgresConnector {
    pool: PgPool,
}

impl PostgresConnector {
    pub async fn connect(config: &DatabaseConfig) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections())
            .acquire_timeout(Duration::from_secs(config.pool_timeout_secs))
            .max_lifetime(Duration::from_secs(config.pool_recycle_secs))
            .connect(&config.url)
            .await?;

        debug!(
            "Connected database pool (size {} + overflow {})",
            config.pool_size, config.max_overflow
        );

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_sqlx_error(err: sqlx::Error, timeout: Duration) -> ConnectorError {
    match &err {
        sqlx::Error::Database(db) => {
            let code = db.code().map(|c| c.to_string()).unwrap_or_default();

            if code == "42501" {
                ConnectorError::Permission(db.message().to_string())
            } else if code.starts_with("42") {
                ConnectorError::Syntax(db.message().to_string())
            } else if code.starts_with("08") || code.starts_with("53") {
                ConnectorError::Connection(db.message().to_string())
            } else if code == "57014" {
                // statement_timeout cancel
                ConnectorError::Timeout(timeout)
            } else {
                ConnectorError::Other(db.message().to_string())
            }
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            ConnectorError::Connection(err.to_string())
        }
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) => ConnectorError::Connection(err.to_string()),
        _ => ConnectorError::Other(err.to_string()),
    }
}

/// Decode one scalar to JSON. Types outside the supported set render null;
/// the pipeline treats row contents as opaque either way.
fn decode_scalar(row: &PgRow, idx: usize, type_name: &str) -> Value {
    match type_name {
        "INT2" => row
            .try_get::<Option<i16>, _>(idx)
            .ok()
            .flatten()
            .map(Value::from)
            .unwrap_or(Value::Null),
        "INT4" => row
            .try_get::<Option<i32>, _>(idx)
            .ok()
            .flatten()
            .map(Value::from)
            .unwrap_or(Value::Null),
        "INT8" => row
            .try_get::<Option<i64>, _>(idx)
            .ok()
            .flatten()
            .map(Value::from)
            .unwrap_or(Value::Null),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(idx)
            .ok()
            .flatten()
            .map(|v| Value::from(v as f64))
            .unwrap_or(Value::Null),
        "FLOAT8" => row
            .try_get::<Option<f64>, _>(idx)
            .ok()
            .flatten()
            .map(Value::from)
            .unwrap_or(Value::Null),
        "BOOL" => row
            .try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(Value::from)
            .unwrap_or(Value::Null),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(idx)
            .ok()
            .flatten()
            .map(|v| Value::from(v.to_rfc3339()))
            .unwrap_or(Value::Null),
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(idx)
            .ok()
            .flatten()
            .map(|v| Value::from(v.to_string()))
            .unwrap_or(Value::Null),
        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(idx)
            .ok()
            .flatten()
            .map(|v| Value::from(v.to_string()))
            .unwrap_or(Value::Null),
        "TIME" => row
            .try_get::<Option<NaiveTime>, _>(idx)
            .ok()
            .flatten()
            .map(|v| Value::from(v.to_string()))
            .unwrap_or(Value::Null),
        _ => row
            .try_get::<Option<String>, _>(idx)
            .ok()
            .flatten()
            .map(Value::from)
            .unwrap_or(Value::Null),
    }
}

#[async_trait]
impl SqlConnector for PostgresConnector {
    async fn execute(&self, sql: &str, timeout: Duration) -> Result<QueryResult, ConnectorError> {
        let fetch = sqlx::query(sql).fetch_all(&self.pool);

        let rows = match tokio::time::timeout(timeout, fetch).await {
            Ok(Ok(rows)) => rows,
            Ok(Err(e)) => return Err(map_sqlx_error(e, timeout)),
            Err(_) => {
                warn!("Statement abandoned after {:?}", timeout);
                return Err(ConnectorError::Timeout(timeout));
            }
        };

        let columns: Vec<String> = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();

        let data = rows
            .iter()
            .map(|row| {
                row.columns()
                    .iter()
                    .enumerate()
                    .map(|(idx, col)| decode_scalar(row, idx, col.type_info().name()))
                    .collect()
            })
            .collect();

        Ok(QueryResult { columns, rows: data })
    }

    async fn list_tables(&self) -> Result<Vec<String>, ConnectorError> {
        let rows = sqlx::query(
            r#"
            SELECT table_name
            FROM information_schema.tables
            WHERE table_schema = 'public' AND table_type = 'BASE TABLE'
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, Duration::ZERO))?;

        let mut tables: Vec<String> = rows
            .iter()
            .filter_map(|row| row.try_get::<String, _>("table_name").ok())
            .collect();

        tables.sort_by_key(|name| name.to_lowercase());

        Ok(tables)
    }

    async fn describe_table(&self, table: &str) -> Result<Vec<ColumnInfo>, ConnectorError> {
        let rows = sqlx::query(
            r#"
            SELECT c.column_name,
                   c.data_type,
                   c.is_nullable,
                   pgd.description
            FROM information_schema.columns c
            LEFT JOIN pg_catalog.pg_statio_all_tables st
                   ON st.schemaname = c.table_schema AND st.relname = c.table_name
            LEFT JOIN pg_catalog.pg_description pgd
                   ON pgd.objoid = st.relid AND pgd.objsubid = c.ordinal_position
            WHERE c.table_schema = 'public' AND c.table_name = $1
            ORDER BY c.ordinal_position
            "#,
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, Duration::ZERO))?;

        Ok(rows
            .iter()
            .map(|row| ColumnInfo {
                name: row.try_get("column_name").unwrap_or_default(),
                data_type: row.try_get("data_type").unwrap_or_default(),
                nullable: row
                    .try_get::<String, _>("is_nullable")
                    .map(|v| v == "YES")
                    .unwrap_or(true),
                comment: row.try_get::<Option<String>, _>("description").ok().flatten(),
            })
            .collect())
    }

    async fn healthy(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }
}
