//! Live catalog reads.
//!
//! Everything here is read-only. Callers choose the database with
//! [`SchemaScope`]; named scopes are queried with explicit schema
//! qualification so no pooled connection is switched with `USE`.

use crate::error::{Error, Result};
use crate::exec::{query_count, Executor, Row, Value};
use crate::model::{KeyFlag, RelationSchema};
use crate::sql;

/// Which database a catalog read targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaScope<'a> {
    /// The connection's default database (`DATABASE()`).
    Current,
    /// An explicitly named database.
    Named(&'a str),
}

impl<'a> SchemaScope<'a> {
    /// `Current` for an empty name, `Named` otherwise.
    pub fn from_name(name: &'a str) -> Self {
        if name.is_empty() {
            SchemaScope::Current
        } else {
            SchemaScope::Named(name)
        }
    }
}

/// One row of `SHOW COLUMNS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveColumn {
    pub name: String,
    /// Declared type as reported by the server, e.g. `int(11)` or `varchar(255)`.
    pub column_type: String,
    pub nullable: bool,
    pub key: KeyFlag,
    pub default: Option<String>,
    /// `auto_increment`, `on update CURRENT_TIMESTAMP`, ...
    pub extra: String,
}

impl LiveColumn {
    fn from_row(row: &Row) -> Self {
        Self {
            name: text(row, "Field"),
            column_type: text(row, "Type"),
            nullable: row
                .get_str("Null")
                .is_some_and(|v| v.eq_ignore_ascii_case("YES")),
            key: KeyFlag::parse(row.get_str("Key").unwrap_or_default()),
            default: row.get("Default").and_then(cell_text),
            extra: text(row, "Extra"),
        }
    }
}

fn text(row: &Row, column: &str) -> String {
    row.get(column).and_then(cell_text).unwrap_or_default()
}

fn cell_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Catalog reader bound to an executor.
pub struct MetadataReader<'a> {
    db: &'a dyn Executor,
}

impl<'a> MetadataReader<'a> {
    pub fn new(db: &'a dyn Executor) -> Self {
        Self { db }
    }

    /// Every database visible to the connection.
    pub async fn list_databases(&self) -> Result<Vec<String>> {
        let rows = self
            .db
            .query(sql::SHOW_DATABASES, &[])
            .await
            .map_err(Error::query("list databases"))?;
        Ok(first_column(rows))
    }

    /// Table names in `scope`, as reported by `SHOW TABLES`.
    pub async fn list_tables(&self, scope: SchemaScope<'_>) -> Result<Vec<String>> {
        let rows = self
            .db
            .query(&sql::show_tables(scope), &[])
            .await
            .map_err(|source| missing_or_query(source, scope_label(scope), "list tables"))?;
        Ok(first_column(rows))
    }

    /// Exact-name existence check in the current database.
    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        let count = query_count(self.db, sql::TABLE_EXISTS, &[Value::from(table)])
            .await
            .map_err(Error::query(format!("table exists {table}")))?;
        Ok(count > 0)
    }

    /// Columns of `table` in declaration order.
    pub async fn columns(&self, scope: SchemaScope<'_>, table: &str) -> Result<Vec<LiveColumn>> {
        let rows = self
            .db
            .query(&sql::show_columns(scope, table), &[])
            .await
            .map_err(|source| missing_or_query(source, table.to_string(), "show columns"))?;
        Ok(rows.iter().map(LiveColumn::from_row).collect())
    }

    /// Outgoing foreign key edges of `table`.
    pub async fn foreign_keys(
        &self,
        scope: SchemaScope<'_>,
        table: &str,
    ) -> Result<Vec<RelationSchema>> {
        let (statement, params) = match scope {
            SchemaScope::Current => (sql::FOREIGN_KEYS_CURRENT, vec![Value::from(table)]),
            SchemaScope::Named(db) => (
                sql::FOREIGN_KEYS_NAMED,
                vec![Value::from(db), Value::from(table)],
            ),
        };
        let rows = self
            .db
            .query(statement, &params)
            .await
            .map_err(Error::query(format!("foreign keys of {table}")))?;

        Ok(rows
            .iter()
            .map(|row| RelationSchema {
                source_table: text(row, "TABLE_NAME"),
                source_column: text(row, "COLUMN_NAME"),
                target_table: text(row, "REFERENCED_TABLE_NAME"),
                target_column: text(row, "REFERENCED_COLUMN_NAME"),
            })
            .collect())
    }
}

fn first_column(rows: Vec<Row>) -> Vec<String> {
    rows.iter()
        .filter_map(|row| row.get_index(0).and_then(cell_text))
        .collect()
}

fn scope_label(scope: SchemaScope<'_>) -> String {
    match scope {
        SchemaScope::Current => "current database".to_string(),
        SchemaScope::Named(db) => db.to_string(),
    }
}

fn missing_or_query(source: crate::error::DbError, object: String, context: &str) -> Error {
    if source.is_missing_object() {
        Error::NotFound(object)
    } else {
        Error::Query {
            context: format!("{context} ({object})"),
            source,
        }
    }
}
