//! Row access for arbitrary tables and raw SQL passthrough.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Map};
use tracing::debug;

use crate::error::{Error, Result};
use crate::exec::{query_count, Executor, Value};
use crate::metadata::{MetadataReader, SchemaScope};
use crate::sql;

/// Rows per page when the caller does not ask for a size.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Largest page a caller may request.
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Leading keywords of raw statements that return a result set.
const ROW_RETURNING: [&str; 6] = ["SELECT", "SHOW", "DESCRIBE", "DESC", "EXPLAIN", "WITH"];

/// One page of a table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TableData {
    /// Every column of the table, in declaration order.
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
    /// Row count of the whole table.
    pub total: i64,
}

/// CRUD and raw SQL over the current database.
#[derive(Clone)]
pub struct DataService {
    db: Arc<dyn Executor>,
}

impl DataService {
    pub fn new(db: Arc<dyn Executor>) -> Self {
        Self { db }
    }

    /// Read page `page` (1-based) of `table`. The page is clamped to at least
    /// 1 and the size to `1..=MAX_PAGE_SIZE`.
    pub async fn page(&self, table: &str, page: u32, limit: u32) -> Result<TableData> {
        require_table(table)?;
        let page = page.max(1);
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let offset = u64::from(page - 1) * u64::from(limit);

        let columns = MetadataReader::new(self.db.as_ref())
            .columns(SchemaScope::Current, table)
            .await?
            .into_iter()
            .map(|c| c.name)
            .collect();

        let total = query_count(self.db.as_ref(), &sql::count_rows(table), &[])
            .await
            .map_err(Error::query(format!("count rows of {table}")))?;

        let rows = self
            .db
            .query(
                &sql::select_page(table),
                &[Value::from(limit), Value::from(offset)],
            )
            .await
            .map_err(Error::query(format!("read rows of {table}")))?
            .into_iter()
            .map(|row| row.into_json())
            .collect();

        Ok(TableData {
            columns,
            rows,
            total,
        })
    }

    /// Insert one row. Keys are column names.
    pub async fn insert(&self, table: &str, values: &Map<String, Value>) -> Result<u64> {
        require_table(table)?;
        if values.is_empty() {
            return Err(Error::Validation("no data to insert".into()));
        }

        let (columns, params) = split_pairs(values);
        let statement = sql::insert(table, &columns);
        debug!(table, columns = columns.len(), "Inserting row");
        self.db
            .execute(&statement, &params)
            .await
            .map_err(Error::ddl(statement.as_str()))
    }

    /// Delete the rows matching every condition. Conditions are required so
    /// that a whole table is never wiped by accident.
    pub async fn delete(&self, table: &str, conditions: &Map<String, Value>) -> Result<u64> {
        require_table(table)?;
        if conditions.is_empty() {
            return Err(Error::Validation(
                "no delete conditions provided (safety block)".into(),
            ));
        }

        let (columns, params) = split_pairs(conditions);
        let statement = sql::delete(table, &columns);
        debug!(table, conditions = columns.len(), "Deleting rows");
        self.db
            .execute(&statement, &params)
            .await
            .map_err(Error::ddl(statement.as_str()))
    }

    /// Run caller-supplied SQL verbatim.
    ///
    /// Row-returning statements yield their rows as objects; anything else
    /// yields a single status object with the affected row count.
    pub async fn execute_raw(&self, statement: &str) -> Result<Vec<Map<String, Value>>> {
        let statement = statement.trim();
        if statement.is_empty() {
            return Err(Error::Validation("query cannot be empty".into()));
        }

        if returns_rows(statement) {
            let rows = self
                .db
                .query_unprepared(statement)
                .await
                .map_err(Error::query("raw query"))?;
            return Ok(rows.into_iter().map(|row| row.into_json()).collect());
        }

        let affected = self
            .db
            .execute_unprepared(statement)
            .await
            .map_err(Error::ddl(statement))?;
        let status = json!({
            "status": "Query executed successfully",
            "rows_affected": affected,
        });
        Ok(match status {
            Value::Object(map) => vec![map],
            _ => Vec::new(),
        })
    }
}

/// Whether a raw statement starts with a row-returning keyword.
pub fn returns_rows(statement: &str) -> bool {
    let keyword: String = statement
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    ROW_RETURNING
        .iter()
        .any(|k| keyword.eq_ignore_ascii_case(k))
}

fn require_table(table: &str) -> Result<()> {
    if table.trim().is_empty() {
        return Err(Error::Validation("table name is required".into()));
    }
    Ok(())
}

fn split_pairs(values: &Map<String, Value>) -> (Vec<&str>, Vec<Value>) {
    values
        .iter()
        .map(|(k, v)| (k.as_str(), v.clone()))
        .unzip()
}
