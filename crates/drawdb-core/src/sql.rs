//! SQL rendering.
//!
//! Every statement the core sends is rendered here, and [`quote_ident`] /
//! [`quote_literal`] are the only quoting routines. Values travel as bound
//! parameters wherever the statement allows it; identifiers and DDL clauses
//! cannot be bound and are quoted instead. Declared column types are passed
//! through verbatim.

use crate::metadata::SchemaScope;
use crate::model::{ColumnDefinition, ForeignKeyDefinition, TableDefinition};
use crate::naming::foreign_key_name;

/// Quote an identifier with backticks, doubling embedded backticks.
pub fn quote_ident(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

/// Quote a string literal, escaping backslashes and single quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
}

/// `db`.`table`, or just `table` for the current database.
pub fn qualified(scope: SchemaScope<'_>, table: &str) -> String {
    match scope {
        SchemaScope::Current => quote_ident(table),
        SchemaScope::Named(db) => format!("{}.{}", quote_ident(db), quote_ident(table)),
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub const DISABLE_FOREIGN_KEY_CHECKS: &str = "SET FOREIGN_KEY_CHECKS=0";
pub const ENABLE_FOREIGN_KEY_CHECKS: &str = "SET FOREIGN_KEY_CHECKS=1";

// ---------------------------------------------------------------------------
// Catalog reads
// ---------------------------------------------------------------------------

pub const SHOW_DATABASES: &str = "SHOW DATABASES";

/// Exact-name lookup. `SHOW TABLES LIKE` would treat `_` as a wildcard.
pub const TABLE_EXISTS: &str = "SELECT COUNT(*) FROM information_schema.TABLES \
     WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?";

/// Params: table.
pub const FOREIGN_KEYS_CURRENT: &str = "SELECT TABLE_NAME, COLUMN_NAME, REFERENCED_TABLE_NAME, REFERENCED_COLUMN_NAME \
     FROM information_schema.KEY_COLUMN_USAGE \
     WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? AND REFERENCED_TABLE_NAME IS NOT NULL \
     ORDER BY CONSTRAINT_NAME, ORDINAL_POSITION";

/// Params: schema, table.
pub const FOREIGN_KEYS_NAMED: &str = "SELECT TABLE_NAME, COLUMN_NAME, REFERENCED_TABLE_NAME, REFERENCED_COLUMN_NAME \
     FROM information_schema.KEY_COLUMN_USAGE \
     WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND REFERENCED_TABLE_NAME IS NOT NULL \
     ORDER BY CONSTRAINT_NAME, ORDINAL_POSITION";

/// Params: constraint name, table.
pub const CONSTRAINT_EXISTS: &str = "SELECT COUNT(*) FROM information_schema.TABLE_CONSTRAINTS \
     WHERE CONSTRAINT_SCHEMA = DATABASE() AND CONSTRAINT_NAME = ? AND TABLE_NAME = ?";

pub fn show_tables(scope: SchemaScope<'_>) -> String {
    match scope {
        SchemaScope::Current => "SHOW TABLES".to_string(),
        SchemaScope::Named(db) => format!("SHOW TABLES FROM {}", quote_ident(db)),
    }
}

pub fn show_columns(scope: SchemaScope<'_>, table: &str) -> String {
    match scope {
        SchemaScope::Current => format!("SHOW COLUMNS FROM {}", quote_ident(table)),
        SchemaScope::Named(db) => format!(
            "SHOW COLUMNS FROM {} FROM {}",
            quote_ident(table),
            quote_ident(db)
        ),
    }
}

// ---------------------------------------------------------------------------
// DDL
// ---------------------------------------------------------------------------

/// `CREATE TABLE` with every column, the composite primary key and one named
/// foreign key constraint per definition.
pub fn create_table(def: &TableDefinition) -> String {
    let mut parts: Vec<String> = def.columns.iter().map(|c| column_sql(c, true)).collect();

    let pk: Vec<String> = def.primary_key_columns().map(quote_ident).collect();
    if !pk.is_empty() {
        parts.push(format!("PRIMARY KEY ({})", pk.join(", ")));
    }

    for fk in &def.foreign_keys {
        parts.push(foreign_key_clause(&def.name, fk));
    }

    format!("CREATE TABLE {} ({})", quote_ident(&def.name), parts.join(", "))
}

/// `ALTER TABLE ... ADD COLUMN`. Primary key and auto-increment flags are
/// not applied to existing tables.
pub fn add_column(table: &str, col: &ColumnDefinition) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN {}",
        quote_ident(table),
        column_sql(col, false)
    )
}

/// `CONSTRAINT fk_<table>_<column> FOREIGN KEY (...) REFERENCES ...(...)`.
pub fn foreign_key_clause(table: &str, fk: &ForeignKeyDefinition) -> String {
    let mut sql = format!(
        "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {}({})",
        quote_ident(&foreign_key_name(table, &fk.column_name)),
        quote_ident(&fk.column_name),
        quote_ident(&fk.ref_table_name),
        quote_ident(&fk.ref_column_name),
    );
    if let Some(action) = fk.on_delete {
        sql.push_str(" ON DELETE ");
        sql.push_str(action.as_sql());
    }
    if let Some(action) = fk.on_update {
        sql.push_str(" ON UPDATE ");
        sql.push_str(action.as_sql());
    }
    sql
}

/// `ALTER TABLE ... ADD CONSTRAINT ... FOREIGN KEY ...`.
pub fn add_foreign_key(table: &str, fk: &ForeignKeyDefinition) -> String {
    format!(
        "ALTER TABLE {} ADD {}",
        quote_ident(table),
        foreign_key_clause(table, fk)
    )
}

pub fn drop_table(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", quote_ident(table))
}

fn column_sql(col: &ColumnDefinition, creating: bool) -> String {
    let mut sql = format!("{} {}", quote_ident(&col.name), col.sql_type());
    if col.not_null {
        sql.push_str(" NOT NULL");
    }
    if creating && col.auto_increment {
        sql.push_str(" AUTO_INCREMENT");
    }
    if let Some(default) = col.default_literal() {
        sql.push_str(" DEFAULT ");
        sql.push_str(&default_value_sql(default));
    }
    sql
}

/// Keywords and numeric literals pass through; anything else becomes a
/// quoted string literal.
fn default_value_sql(raw: &str) -> String {
    let trimmed = raw.trim();
    let upper = trimmed.to_ascii_uppercase();

    let is_keyword = matches!(
        upper.as_str(),
        "NULL" | "TRUE" | "FALSE" | "CURRENT_TIMESTAMP" | "CURRENT_DATE" | "CURRENT_TIME"
    ) || upper
        .strip_prefix("CURRENT_TIMESTAMP(")
        .and_then(|rest| rest.strip_suffix(')'))
        .is_some_and(|precision| precision.chars().all(|c| c.is_ascii_digit()));

    if is_keyword || is_numeric_literal(trimmed) {
        upper_if_keyword(trimmed, is_keyword)
    } else {
        quote_literal(raw)
    }
}

fn upper_if_keyword(raw: &str, is_keyword: bool) -> String {
    if is_keyword {
        raw.to_ascii_uppercase()
    } else {
        raw.to_string()
    }
}

fn is_numeric_literal(raw: &str) -> bool {
    let digits = raw.strip_prefix('-').unwrap_or(raw);
    let mut seen_dot = false;
    !digits.is_empty()
        && !digits.starts_with('.')
        && digits.chars().all(|c| match c {
            '0'..='9' => true,
            '.' if !seen_dot => {
                seen_dot = true;
                true
            }
            _ => false,
        })
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

pub fn count_rows(table: &str) -> String {
    format!("SELECT COUNT(*) FROM {}", quote_ident(table))
}

/// Params: limit, offset.
pub fn select_page(table: &str) -> String {
    format!("SELECT * FROM {} LIMIT ? OFFSET ?", quote_ident(table))
}

pub fn insert(table: &str, columns: &[&str]) -> String {
    let cols: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    let placeholders = vec!["?"; columns.len()];
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        cols.join(", "),
        placeholders.join(", ")
    )
}

/// ANDed null-safe equality predicates, so `null` conditions match `NULL` cells.
pub fn delete(table: &str, columns: &[&str]) -> String {
    let predicates: Vec<String> = columns
        .iter()
        .map(|c| format!("{} <=> ?", quote_ident(c)))
        .collect();
    format!(
        "DELETE FROM {} WHERE {}",
        quote_ident(table),
        predicates.join(" AND ")
    )
}

// ---------------------------------------------------------------------------
// Databases
// ---------------------------------------------------------------------------

pub fn create_database(name: &str) -> String {
    format!("CREATE DATABASE IF NOT EXISTS {}", quote_ident(name))
}

pub fn drop_database(name: &str) -> String {
    format!("DROP DATABASE IF EXISTS {}", quote_ident(name))
}

pub fn move_table(from_db: &str, to_db: &str, table: &str) -> String {
    format!(
        "RENAME TABLE {} TO {}",
        qualified(SchemaScope::Named(from_db), table),
        qualified(SchemaScope::Named(to_db), table)
    )
}

// ---------------------------------------------------------------------------
// Layout side table
// ---------------------------------------------------------------------------

pub fn create_layout_table(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (`table_name` VARCHAR(255) PRIMARY KEY, `x` INT, `y` INT)",
        quote_ident(table)
    )
}

/// Params: table name, x, y.
pub fn replace_layout(table: &str) -> String {
    format!(
        "REPLACE INTO {} (`table_name`, `x`, `y`) VALUES (?, ?, ?)",
        quote_ident(table)
    )
}

pub fn select_layout(table: &str) -> String {
    format!("SELECT `table_name`, `x`, `y` FROM {}", quote_ident(table))
}
