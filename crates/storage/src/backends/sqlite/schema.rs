//! SQLite table definitions derived from the schema registry.

use rusqlite::Connection;

use crate::error::{BackendError, StorageError, StorageResult};
use crate::schema::{SchemaDescriptor, SchemaRegistry};

use super::backend::BACKEND_NAME;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Creates the version table and one table per registered kind.
pub fn initialize_schema(conn: &Connection, registry: &SchemaRegistry) -> StorageResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER NOT NULL
        );",
    )
    .map_err(|e| schema_error("Failed to create schema_version table", e))?;

    let current: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .ok();
    if current.is_none() {
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [SCHEMA_VERSION],
        )
        .map_err(|e| schema_error("Failed to record schema version", e))?;
    }

    for (kind, descriptor) in registry.iter() {
        conn.execute_batch(&create_table_sql(descriptor))
            .map_err(|e| schema_error(&format!("Failed to create table for {kind}"), e))?;
        tracing::debug!(kind, table = descriptor.table_name(), "ensured table");
    }

    Ok(())
}

/// Builds the `CREATE TABLE` and `CREATE INDEX` statements for a layout.
pub fn create_table_sql(descriptor: &SchemaDescriptor) -> String {
    let table = descriptor.table_name();
    let mut columns = vec![
        format!(
            "\"{}\" TEXT NOT NULL UNIQUE",
            descriptor.resource_key_column()
        ),
        format!("\"{}\" BLOB NOT NULL", descriptor.raw_object_column()),
    ];
    for def in descriptor.columns().iter().filter(|c| !c.resource_key) {
        columns.push(format!("\"{}\" {}", def.column, def.column_type.sql_type()));
    }

    let mut sql = format!(
        "CREATE TABLE IF NOT EXISTS \"{table}\" (\n    {}\n);\n",
        columns.join(",\n    ")
    );
    for def in descriptor.columns().iter().filter(|c| !c.resource_key) {
        sql.push_str(&format!(
            "CREATE INDEX IF NOT EXISTS \"idx_{table}_{col}\" ON \"{table}\" (\"{col}\");\n",
            col = def.column
        ));
    }
    sql
}

fn schema_error(context: &str, err: rusqlite::Error) -> StorageError {
    StorageError::Backend(BackendError::Internal {
        backend_name: BACKEND_NAME.to_string(),
        key: String::new(),
        message: format!("{context}: {err}"),
        source: Some(Box::new(err)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnType;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::builder()
            .register_kind(
                "Widget",
                SchemaDescriptor::builder("widgets")
                    .resource_key("metadata.name", "name")
                    .constant("metadata.namespace", "namespace", ColumnType::Text)
                    .column("spec.count", "count", ColumnType::Integer),
            )
            .unwrap()
            .build()
    }

    #[test]
    fn test_create_table_sql() {
        let registry = registry();
        let sql = create_table_sql(registry.get("Widget").unwrap());
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS \"widgets\""));
        assert!(sql.contains("\"name\" TEXT NOT NULL UNIQUE"));
        assert!(sql.contains("\"rawobj\" BLOB NOT NULL"));
        assert!(sql.contains("\"count\" INTEGER"));
        assert!(sql.contains("\"idx_widgets_namespace\""));
    }

    #[test]
    fn test_initialize_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        let registry = registry();
        initialize_schema(&conn, &registry).unwrap();
        initialize_schema(&conn, &registry).unwrap();

        let version: i32 = conn
            .query_row("SELECT version FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'widgets'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 1);
    }
}
