use sqlx::{PgPool, Row};

use fluxbase_core::error::{FluxbaseError, Result};
use fluxbase_core::procedure::is_safe_identifier;

/// Schemas never surfaced to admin tooling.
const SYSTEM_SCHEMAS: [&str; 3] = ["pg_catalog", "information_schema", "pg_toast"];

/// Read-only `information_schema` reader. Runs under the service-role
/// connection — schema metadata is not row-level-secured.
#[derive(Clone)]
pub struct SchemaInspector {
    pool: PgPool,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ForeignKeyInfo {
    pub column: String,
    pub foreign_schema: String,
    pub foreign_table: String,
    pub foreign_column: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct TableInfo {
    pub schema: String,
    pub table: String,
    pub columns: Vec<ColumnInfo>,
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKeyInfo>,
}

impl SchemaInspector {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// List non-system schema names.
    pub async fn list_schemas(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT schema_name FROM information_schema.schemata \
             WHERE schema_name != ALL($1) AND schema_name NOT LIKE 'pg\\_%' \
             ORDER BY schema_name",
        )
        .bind(&SYSTEM_SCHEMAS[..])
        .fetch_all(&self.pool)
        .await
        .map_err(FluxbaseError::Sql)?;

        Ok(rows.into_iter().map(|r| r.get::<String, _>("schema_name")).collect())
    }

    /// Describe a single table: columns, primary key, foreign keys.
    pub async fn describe_table(&self, schema: &str, table: &str) -> Result<TableInfo> {
        if !is_safe_identifier(schema) || !is_safe_identifier(table) {
            return Err(FluxbaseError::Validation(format!(
                "invalid schema or table name: {schema}.{table}"
            )));
        }

        let column_rows = sqlx::query(
            "SELECT column_name, data_type, is_nullable, column_default \
             FROM information_schema.columns \
             WHERE table_schema = $1 AND table_name = $2 \
             ORDER BY ordinal_position",
        )
        .bind(schema)
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(FluxbaseError::Sql)?;

        if column_rows.is_empty() {
            return Err(FluxbaseError::NotFound(format!("{schema}.{table}")));
        }

        let columns = column_rows
            .into_iter()
            .map(|row| ColumnInfo {
                name: row.get("column_name"),
                data_type: row.get("data_type"),
                nullable: row.get::<String, _>("is_nullable") == "YES",
                default: row.get("column_default"),
            })
            .collect();

        let pk_rows = sqlx::query(
            "SELECT kcu.column_name \
             FROM information_schema.table_constraints tc \
             JOIN information_schema.key_column_usage kcu \
               ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
             WHERE tc.table_schema = $1 AND tc.table_name = $2 AND tc.constraint_type = 'PRIMARY KEY' \
             ORDER BY kcu.ordinal_position",
        )
        .bind(schema)
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(FluxbaseError::Sql)?;

        let primary_key = pk_rows.into_iter().map(|r| r.get::<String, _>("column_name")).collect();

        let fk_rows = sqlx::query(
            "SELECT kcu.column_name, ccu.table_schema AS foreign_schema, \
                    ccu.table_name AS foreign_table, ccu.column_name AS foreign_column \
             FROM information_schema.table_constraints tc \
             JOIN information_schema.key_column_usage kcu \
               ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
             JOIN information_schema.constraint_column_usage ccu \
               ON tc.constraint_name = ccu.constraint_name \
             WHERE tc.table_schema = $1 AND tc.table_name = $2 AND tc.constraint_type = 'FOREIGN KEY'",
        )
        .bind(schema)
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(FluxbaseError::Sql)?;

        let foreign_keys = fk_rows
            .into_iter()
            .map(|row| ForeignKeyInfo {
                column: row.get("column_name"),
                foreign_schema: row.get("foreign_schema"),
                foreign_table: row.get("foreign_table"),
                foreign_column: row.get("foreign_column"),
            })
            .collect();

        Ok(TableInfo {
            schema: schema.to_string(),
            table: table.to_string(),
            columns,
            primary_key,
            foreign_keys,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsafe_identifiers() {
        assert!(is_safe_identifier("public"));
        assert!(!is_safe_identifier("public; DROP TABLE users"));
        assert!(!is_safe_identifier("2invalid"));
    }
}
