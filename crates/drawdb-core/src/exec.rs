//! Database execution interface.
//!
//! Every component of the core receives an [`Executor`] explicitly instead of
//! reaching for a process-wide handle. Parameters and result cells are plain
//! JSON values so that the interface stays driver-agnostic.

use async_trait::async_trait;
use serde_json::Map;

use crate::error::DbError;

/// A statement parameter or result cell.
pub type Value = serde_json::Value;

/// One result row: column names paired with their values, in select order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a cell.
    pub fn push(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.columns.push(column.into());
        self.values.push(value.into());
    }

    /// Append a cell, builder style.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, value);
        self
    }

    /// Column names in select order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the row has no cells.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Look up a cell by column name.
    ///
    /// Matching ignores ASCII case: catalog views report column names in
    /// upper or lower case depending on the server version.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .map(|idx| &self.values[idx])
    }

    /// Look up a cell by position.
    pub fn get_index(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    /// String cell by column name. `NULL` and non-strings yield `None`.
    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(Value::as_str)
    }

    /// Integer cell by position, accepting numeric strings.
    pub fn get_i64_at(&self, idx: usize) -> Option<i64> {
        self.get_index(idx).and_then(value_as_i64)
    }

    /// Integer cell by column name, accepting numeric strings.
    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(value_as_i64)
    }

    /// Convert into a JSON object keyed by column name.
    pub fn into_json(self) -> Map<String, Value> {
        self.columns.into_iter().zip(self.values).collect()
    }
}

fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Statement execution against a live database.
///
/// Implementations must be cheap to share between requests; the pooled
/// MySQL executor hands out a connection per call.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run a statement that returns no rows. Returns the affected row count.
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, DbError>;

    /// Run a statement and collect every returned row.
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DbError>;

    /// Pin a single connection.
    ///
    /// Session variables such as `FOREIGN_KEY_CHECKS` only apply to the
    /// connection that set them, so multi-statement work that depends on them
    /// must run through the returned executor.
    async fn session(&self) -> Result<Box<dyn Executor>, DbError>;

    /// Run caller-supplied SQL over the text protocol and return the
    /// affected row count.
    ///
    /// Unlike [`execute`](Self::execute) the statement is not prepared, so
    /// statements the server refuses to prepare still run. Never pass
    /// generated SQL here.
    async fn execute_unprepared(&self, sql: &str) -> Result<u64, DbError> {
        self.execute(sql, &[]).await
    }

    /// Row-returning counterpart of [`execute_unprepared`](Self::execute_unprepared).
    async fn query_unprepared(&self, sql: &str) -> Result<Vec<Row>, DbError> {
        self.query(sql, &[]).await
    }

    /// Check that the database answers.
    async fn ping(&self) -> Result<(), DbError> {
        self.query("SELECT 1", &[]).await.map(|_| ())
    }

    /// Mark a pinned connection as unusable so it is closed instead of being
    /// returned to the pool. No-op for executors that do not pin.
    fn discard(&self) {}
}

/// Run a `SELECT COUNT(*)`-style query and read the first cell of the first row.
pub(crate) async fn query_count(
    db: &dyn Executor,
    sql: &str,
    params: &[Value],
) -> Result<i64, DbError> {
    let rows = db.query(sql, params).await?;
    Ok(rows.first().and_then(|row| row.get_i64_at(0)).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_row_lookup_ignores_case() {
        let row = Row::new()
            .with("TABLE_NAME", "orders")
            .with("COLUMN_NAME", "user_id");

        assert_eq!(row.get_str("table_name"), Some("orders"));
        assert_eq!(row.get_str("Column_Name"), Some("user_id"));
        assert_eq!(row.get_str("missing"), None);
        assert_eq!(row.len(), 2);
    }

    #[test]
    fn test_row_integer_cells() {
        let row = Row::new()
            .with("COUNT(*)", 3)
            .with("as_text", "42")
            .with("null", Value::Null);

        assert_eq!(row.get_i64_at(0), Some(3));
        assert_eq!(row.get_i64("as_text"), Some(42));
        assert_eq!(row.get_i64("null"), None);
    }

    #[test]
    fn test_row_into_json() {
        let row = Row::new().with("id", 1).with("name", "ada");
        let obj = row.into_json();
        assert_eq!(Value::Object(obj), json!({"id": 1, "name": "ada"}));
    }
}
