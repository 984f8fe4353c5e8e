//! Database and table administration.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::exec::Executor;
use crate::introspect::is_reserved;
use crate::layout::LAYOUT_TABLE;
use crate::metadata::{MetadataReader, SchemaScope};
use crate::sql;

/// Databases owned by the server itself.
pub const SYSTEM_DATABASES: [&str; 4] = ["information_schema", "mysql", "performance_schema", "sys"];

/// Whether `name` is a system database.
pub fn is_system_database(name: &str) -> bool {
    SYSTEM_DATABASES
        .iter()
        .any(|db| db.eq_ignore_ascii_case(name))
}

/// Database-level operations.
#[derive(Clone)]
pub struct DatabaseService {
    db: Arc<dyn Executor>,
}

impl DatabaseService {
    pub fn new(db: Arc<dyn Executor>) -> Self {
        Self { db }
    }

    /// Every database visible to the connection, system databases included.
    pub async fn list(&self) -> Result<Vec<String>> {
        MetadataReader::new(self.db.as_ref()).list_databases().await
    }

    /// Create `name` unless it exists.
    pub async fn create(&self, name: &str) -> Result<()> {
        require_name(name, "database name is required")?;
        self.run(sql::create_database(name)).await?;
        info!(database = name, "Database created");
        Ok(())
    }

    /// Drop `name` if it exists. System databases are refused.
    pub async fn drop(&self, name: &str) -> Result<()> {
        require_name(name, "database name is required")?;
        if is_system_database(name) {
            return Err(Error::Protected(format!(
                "cannot drop system database {name}"
            )));
        }
        self.run(sql::drop_database(name)).await?;
        info!(database = name, "Database dropped");
        Ok(())
    }

    /// Move every table of `old` into a new database `new`, then drop `old`.
    ///
    /// Not atomic: a failure part-way leaves the tables moved so far in `new`.
    pub async fn rename(&self, old: &str, new: &str) -> Result<()> {
        if old.trim().is_empty() || new.trim().is_empty() {
            return Err(Error::Validation("old and new names are required".into()));
        }
        if is_system_database(old) {
            return Err(Error::Protected(format!(
                "cannot rename system database {old}"
            )));
        }
        if old == new {
            return Ok(());
        }

        self.run(sql::create_database(new)).await?;

        let tables = MetadataReader::new(self.db.as_ref())
            .list_tables(SchemaScope::Named(old))
            .await?;

        let mut moved = 0usize;
        for table in tables.iter().filter(|t| !is_reserved(t)) {
            if let Err(err) = self.run(sql::move_table(old, new, table)).await {
                warn!(from = old, to = new, moved, "Database rename stopped part-way");
                return Err(err);
            }
            moved += 1;
        }

        if tables.iter().any(|t| t == LAYOUT_TABLE) {
            self.run(sql::move_table(old, new, LAYOUT_TABLE)).await?;
        }

        self.run(sql::drop_database(old)).await?;
        info!(from = old, to = new, tables = moved, "Database renamed");
        Ok(())
    }

    /// Drop a table of the current database if it exists.
    pub async fn drop_table(&self, table: &str) -> Result<()> {
        require_name(table, "table name is required")?;
        self.run(sql::drop_table(table)).await?;
        info!(table, "Table dropped");
        Ok(())
    }

    async fn run(&self, statement: String) -> Result<u64> {
        self.db
            .execute(&statement, &[])
            .await
            .map_err(Error::ddl(statement.as_str()))
    }
}

fn require_name(name: &str, message: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::Validation(message.to_string()));
    }
    Ok(())
}
