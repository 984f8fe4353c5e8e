//! MySQL [`Executor`] backed by a sqlx connection pool.
//!
//! Statements go through `sqlx::query`, one prepared statement per call, so
//! a single call can never run more than one statement. Only the
//! `*_unprepared` methods use the text protocol (`sqlx::raw_sql`), for SQL
//! typed by the user.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Number;
use sqlx::mysql::{MySql, MySqlArguments, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::pool::PoolConnection;
use sqlx::query::Query;
use sqlx::types::Json;
use sqlx::{Column, Row as _, TypeInfo, ValueRef};
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::DbError;
use crate::exec::{Executor, Row, Value};

/// Pool sizing.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub min_connections: u32,
    /// Upper bound on waiting for a free connection.
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 0,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

impl PoolSettings {
    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    fn options(&self) -> MySqlPoolOptions {
        MySqlPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(self.acquire_timeout)
    }
}

/// Pooled executor. Each call borrows a connection for one statement.
#[derive(Debug, Clone)]
pub struct MySqlExecutor {
    pool: MySqlPool,
}

impl MySqlExecutor {
    /// Build the pool without opening a connection. Only the DSN is checked.
    pub fn connect_lazy(dsn: &str, settings: &PoolSettings) -> Result<Self, DbError> {
        let pool = settings.options().connect_lazy(dsn)?;
        Ok(Self { pool })
    }

    /// Build the pool and open the first connection.
    pub async fn connect(dsn: &str, settings: &PoolSettings) -> Result<Self, DbError> {
        let pool = settings.options().connect(dsn).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

#[async_trait]
impl Executor for MySqlExecutor {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, DbError> {
        execute_on(&self.pool, sql, params).await
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DbError> {
        fetch_rows(&self.pool, sql, params).await
    }

    async fn execute_unprepared(&self, sql: &str) -> Result<u64, DbError> {
        Ok(sqlx::raw_sql(sql).execute(&self.pool).await?.rows_affected())
    }

    async fn query_unprepared(&self, sql: &str) -> Result<Vec<Row>, DbError> {
        let rows = sqlx::raw_sql(sql).fetch_all(&self.pool).await?;
        rows.iter().map(decode_row).collect()
    }

    async fn session(&self) -> Result<Box<dyn Executor>, DbError> {
        let conn = self.pool.acquire().await?;
        Ok(Box::new(MySqlSession {
            conn: Arc::new(Mutex::new(conn)),
        }))
    }
}

/// One pinned pool connection. Returned to the pool when the last handle drops.
pub struct MySqlSession {
    conn: Arc<Mutex<PoolConnection<MySql>>>,
}

#[async_trait]
impl Executor for MySqlSession {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, DbError> {
        let mut conn = self.conn.lock().await;
        execute_on(&mut **conn, sql, params).await
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DbError> {
        let mut conn = self.conn.lock().await;
        fetch_rows(&mut **conn, sql, params).await
    }

    async fn execute_unprepared(&self, sql: &str) -> Result<u64, DbError> {
        let mut conn = self.conn.lock().await;
        Ok(sqlx::Executor::execute(&mut **conn, sqlx::raw_sql(sql))
            .await?
            .rows_affected())
    }

    async fn query_unprepared(&self, sql: &str) -> Result<Vec<Row>, DbError> {
        let mut conn = self.conn.lock().await;
        let rows = sqlx::Executor::fetch_all(&mut **conn, sqlx::raw_sql(sql)).await?;
        rows.iter().map(decode_row).collect()
    }

    async fn session(&self) -> Result<Box<dyn Executor>, DbError> {
        Ok(Box::new(MySqlSession {
            conn: Arc::clone(&self.conn),
        }))
    }

    fn discard(&self) {
        match self.conn.try_lock() {
            Ok(mut conn) => conn.close_on_drop(),
            Err(_) => warn!("Session busy, connection not marked for close"),
        }
    }
}

async fn execute_on<'e, E>(executor: E, sql: &'e str, params: &'e [Value]) -> Result<u64, DbError>
where
    E: sqlx::Executor<'e, Database = MySql> + 'e,
{
    let result = bind_params(sqlx::query(sql), params)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

async fn fetch_rows<'e, E>(
    executor: E,
    sql: &'e str,
    params: &'e [Value],
) -> Result<Vec<Row>, DbError>
where
    E: sqlx::Executor<'e, Database = MySql> + 'e,
{
    let rows = bind_params(sqlx::query(sql), params)
        .fetch_all(executor)
        .await?;
    rows.iter().map(decode_row).collect()
}

fn bind_params<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    params: &'q [Value],
) -> Query<'q, MySql, MySqlArguments> {
    for param in params {
        query = match param {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    query.bind(i)
                } else if let Some(u) = n.as_u64() {
                    query.bind(u)
                } else {
                    query.bind(n.as_f64())
                }
            }
            Value::String(s) => query.bind(s.as_str()),
            // Arrays and objects are stored as their JSON text.
            other => query.bind(other.to_string()),
        };
    }
    query
}

fn decode_row(row: &MySqlRow) -> Result<Row, DbError> {
    let mut out = Row::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let value = decode_cell(row, idx, column.type_info().name()).map_err(|err| {
            DbError::Decode {
                column: column.name().to_string(),
                reason: err.to_string(),
            }
        })?;
        out.push(column.name(), value);
    }
    Ok(out)
}

fn decode_cell(row: &MySqlRow, idx: usize, type_name: &str) -> Result<Value, sqlx::Error> {
    if row.try_get_raw(idx)?.is_null() {
        return Ok(Value::Null);
    }

    let value = match type_name {
        "BOOLEAN" => Value::Bool(row.try_get_unchecked::<bool, _>(idx)?),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
            Value::from(row.try_get_unchecked::<i64, _>(idx)?)
        }
        name if name.ends_with("UNSIGNED") => Value::from(row.try_get_unchecked::<u64, _>(idx)?),
        "FLOAT" => float(f64::from(row.try_get_unchecked::<f32, _>(idx)?)),
        "DOUBLE" => float(row.try_get_unchecked::<f64, _>(idx)?),
        // Exact decimals keep their textual form.
        "DECIMAL" => Value::String(row.try_get_unchecked::<String, _>(idx)?),
        "DATETIME" => Value::String(row.try_get_unchecked::<NaiveDateTime, _>(idx)?.to_string()),
        "TIMESTAMP" => Value::String(
            row.try_get_unchecked::<DateTime<Utc>, _>(idx)?
                .to_rfc3339(),
        ),
        "DATE" => Value::String(row.try_get_unchecked::<NaiveDate, _>(idx)?.to_string()),
        // TIME is an interval and may fall outside a time of day.
        "TIME" => match row.try_get_unchecked::<NaiveTime, _>(idx) {
            Ok(t) => Value::String(t.to_string()),
            Err(_) => bytes(row.try_get_unchecked::<Vec<u8>, _>(idx)?),
        },
        "JSON" => row.try_get_unchecked::<Json<Value>, _>(idx)?.0,
        _ => bytes(row.try_get_unchecked::<Vec<u8>, _>(idx)?),
    };
    Ok(value)
}

fn float(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

/// Text for UTF-8 content, `0x`-prefixed hex otherwise.
fn bytes(raw: Vec<u8>) -> Value {
    match String::from_utf8(raw) {
        Ok(s) => Value::String(s),
        Err(err) => Value::String(format!("0x{}", hex::encode(err.into_bytes()))),
    }
}
