// src/catalog/mod.rs

//! Lazy, cached schema catalog.
//!
//! Rendering is deterministic: two concurrent refreshes of the same
//! underlying schema produce byte-equal text. The DDL snapshots show up in
//! LM prompts and in cache keys, so byte stability is a correctness
//! property, not cosmetics.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::cache::{Cache, Namespace, keys};
use crate::connector::{ColumnInfo, ConnectorError, SqlConnector};
use crate::error::{CoreError, CoreResult, ErrorKind};

/// Reserved key for the table list inside the `schema` namespace.
const TABLE_LIST_KEY: &str = "__tables__";

pub struct SchemaCatalog {
    connector: Arc<dyn SqlConnector>,
    cache: Cache,
    ttl: Duration,
    /// Last complete snapshot of the table list; survives refresh failures.
    last_tables: RwLock<Option<Vec<String>>>,
}

impl SchemaCatalog {
    pub fn new(connector: Arc<dyn SqlConnector>, cache: Cache, ttl_secs: u64) -> Self {
        Self {
            connector,
            cache,
            ttl: Duration::from_secs(ttl_secs),
            last_tables: RwLock::new(None),
        }
    }

    /// Known table names, sorted case-insensitively.
    pub async fn tables(&self) -> CoreResult<Vec<String>> {
        if let Some(tables) = self
            .cache
            .get_json::<Vec<String>>(Namespace::Schema, TABLE_LIST_KEY)
            .await
        {
            return Ok(tables);
        }

        match self.connector.list_tables().await {
            Ok(mut tables) => {
                tables.sort_by_key(|name| name.to_lowercase());
                self.cache
                    .put_json(Namespace::Schema, TABLE_LIST_KEY, &tables, self.ttl)
                    .await;
                *self.last_tables.write().await = Some(tables.clone());
                Ok(tables)
            }
            Err(e) => {
                // Expired cache but a previous snapshot exists: serve it
                if let Some(tables) = self.last_tables.read().await.clone() {
                    warn!("Table listing failed, serving last snapshot: {}", e);
                    return Ok(tables);
                }
                Err(catalog_error(e))
            }
        }
    }

    /// Canonical DDL-like text for one table.
    pub async fn ddl(&self, table: &str) -> CoreResult<String> {
        let key = keys::schema_key(table);

        if let Some(text) = self.cache.get_json::<String>(Namespace::Schema, &key).await {
            return Ok(text);
        }

        let columns = self
            .connector
            .describe_table(table)
            .await
            .map_err(catalog_error)?;

        if columns.is_empty() {
            return Err(CoreError::new(
                ErrorKind::InternalError,
                format!("table {} has no columns or does not exist", table),
            ));
        }

        let text = render_ddl(table, &columns);
        self.cache
            .put_json(Namespace::Schema, &key, &text, self.ttl)
            .await;

        debug!(table, "Rendered DDL snapshot");
        Ok(text)
    }

    /// Re-introspect every table. Idempotent; on failure the previous
    /// snapshots stay valid and the error is surfaced to the caller.
    pub async fn refresh(&self) -> CoreResult<usize> {
        let mut tables = self.connector.list_tables().await.map_err(catalog_error)?;
        tables.sort_by_key(|name| name.to_lowercase());

        let mut refreshed = 0;
        for table in &tables {
            let columns = self
                .connector
                .describe_table(table)
                .await
                .map_err(catalog_error)?;

            if columns.is_empty() {
                continue;
            }

            let text = render_ddl(table, &columns);
            self.cache
                .put_json(Namespace::Schema, &keys::schema_key(table), &text, self.ttl)
                .await;
            refreshed += 1;
        }

        self.cache
            .put_json(Namespace::Schema, TABLE_LIST_KEY, &tables, self.ttl)
            .await;
        *self.last_tables.write().await = Some(tables);

        info!(refreshed, "Schema catalog refreshed");
        Ok(refreshed)
    }

    /// Drop the snapshot for one table; the next access re-introspects.
    pub async fn invalidate(&self, table: &str) {
        self.cache
            .invalidate(Namespace::Schema, &keys::schema_key(table))
            .await;
        self.cache.invalidate(Namespace::Schema, TABLE_LIST_KEY).await;
    }
}

fn catalog_error(e: ConnectorError) -> CoreError {
    CoreError {
        kind: ErrorKind::InternalError,
        message: format!("schema introspection failed: {}", e),
        transient: e.is_transient(),
    }
}

/// Render column metadata into canonical DDL-like text. Column order is
/// ordinal; the output must stay byte-stable for a fixed input.
fn render_ddl(table: &str, columns: &[ColumnInfo]) -> String {
    let mut out = format!("CREATE TABLE {} (\n", table);

    for (idx, col) in columns.iter().enumerate() {
        let nullability = if col.nullable { "NULL" } else { "NOT NULL" };
        let separator = if idx + 1 == columns.len() { "" } else { "," };

        out.push_str(&format!("    {} {} {}{}", col.name, col.data_type, nullability, separator));

        if let Some(comment) = &col.comment {
            out.push_str(&format!(" -- {}", comment));
        }

        out.push('\n');
    }

    out.push_str(");");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str, data_type: &str, nullable: bool, comment: Option<&str>) -> ColumnInfo {
        ColumnInfo {
            name: name.to_string(),
            data_type: data_type.to_string(),
            nullable,
            comment: comment.map(|c| c.to_string()),
        }
    }

    #[test]
    fn test_render_ddl_shape() {
        let columns = vec![
            column("id", "integer", false, Some("primary key")),
            column("name", "text", true, None),
            column("created_at", "timestamp", true, Some("signup time")),
        ];

        let text = render_ddl("users", &columns);
        assert_eq!(
            text,
            "CREATE TABLE users (\n    id integer NOT NULL, -- primary key\n    name text NULL,\n    created_at timestamp NULL -- signup time\n);"
        );
    }

    #[test]
    fn test_render_ddl_is_byte_stable() {
        let columns = vec![
            column("id", "integer", false, None),
            column("name", "text", true, Some("display name")),
        ];

        assert_eq!(render_ddl("users", &columns), render_ddl("users", &columns));
    }

    #[tokio::test]
    async fn test_lazy_load_sorts_and_caches() {
        let connector = Arc::new(
            crate::testing::MockConnector::new()
                .with_table("Orders", vec![("id", "integer", false, None)])
                .with_table("accounts", vec![("id", "integer", false, None)]),
        );
        let catalog = SchemaCatalog::new(connector, Cache::in_memory(100), 3_600);

        // Case-insensitive ordering regardless of listing order
        assert_eq!(catalog.tables().await.unwrap(), vec!["accounts", "Orders"]);

        let ddl = catalog.ddl("Orders").await.unwrap();
        assert!(ddl.starts_with("CREATE TABLE Orders ("));

        // Invalidation forces re-introspection on next access
        catalog.invalidate("Orders").await;
        assert_eq!(catalog.ddl("Orders").await.unwrap(), ddl);
    }

    #[tokio::test]
    async fn test_unknown_table_errors() {
        let connector = Arc::new(
            crate::testing::MockConnector::new()
                .with_table("users", vec![("id", "integer", false, None)]),
        );
        let catalog = SchemaCatalog::new(connector, Cache::in_memory(100), 3_600);

        let err = catalog.ddl("payments").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InternalError);
    }
}
