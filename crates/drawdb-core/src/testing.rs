//! In-memory stand-in for a MySQL server.
//!
//! [`FakeDatabase`] implements [`Executor`] by interpreting exactly the
//! statements rendered by [`crate::sql`]: catalog reads, additive DDL, row
//! CRUD, database administration and the layout table. It keeps a log of
//! every statement it receives and can be told to fail on a pattern.
//!
//! Anything else is rejected with error 1064 unless a canned response was
//! registered with [`FakeDatabase::stub_rows`] or [`FakeDatabase::stub_affected`].
//!
//! Available in unit tests and, for downstream crates, behind the `testing`
//! feature.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Map;

use crate::error::{DbError, ER_BAD_DB_ERROR, ER_NO_SUCH_TABLE};
use crate::exec::{Executor, Row, Value};
use crate::model::TableDefinition;
use crate::sql;

const ER_TABLE_EXISTS: u16 = 1050;
const ER_BAD_FIELD: u16 = 1054;
const ER_DUP_FIELDNAME: u16 = 1060;
const ER_PARSE_ERROR: u16 = 1064;
const ER_WRONG_VALUE_COUNT: u16 = 1136;
const ER_NO_DEFAULT: u16 = 1364;
const ER_FK_CANNOT_OPEN_PARENT: u16 = 1824;
const ER_FK_DUP_NAME: u16 = 1826;
const ER_KEY_COLUMN_DOES_NOT_EXIST: u16 = 1072;

const SYSTEM_DATABASES: [&str; 4] = ["information_schema", "mysql", "performance_schema", "sys"];

#[derive(Debug, Clone)]
struct FakeColumn {
    name: String,
    column_type: String,
    not_null: bool,
    primary_key: bool,
    auto_increment: bool,
    default: Option<String>,
    key_override: Option<String>,
}

#[derive(Debug, Clone)]
struct FakeConstraint {
    name: String,
    column: String,
    ref_table: String,
    ref_column: String,
}

#[derive(Debug, Clone, Default)]
struct FakeTable {
    columns: Vec<FakeColumn>,
    constraints: Vec<FakeConstraint>,
    rows: Vec<Map<String, Value>>,
    next_id: i64,
}

impl FakeTable {
    fn column(&self, name: &str) -> Option<&FakeColumn> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    fn key_flag(&self, col: &FakeColumn) -> String {
        if col.primary_key {
            "PRI".to_string()
        } else if let Some(key) = &col.key_override {
            key.clone()
        } else if self.constraints.iter().any(|c| c.column == col.name) {
            "MUL".to_string()
        } else {
            String::new()
        }
    }

    /// Fill a row in column order. `values` keys are matched case-insensitively.
    fn build_row(&mut self, values: &[(String, Value)]) -> Result<Map<String, Value>, DbError> {
        for (name, _) in values {
            if self.column(name).is_none() {
                return Err(engine(
                    ER_BAD_FIELD,
                    format!("Unknown column '{name}' in 'field list'"),
                ));
            }
        }

        let mut row = Map::new();
        for col in &self.columns {
            let provided = values
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(&col.name))
                .map(|(_, v)| v.clone());

            let value = match provided {
                Some(v) if !(v.is_null() && col.auto_increment) => {
                    if col.auto_increment {
                        if let Some(id) = as_i64(&v) {
                            self.next_id = self.next_id.max(id);
                        }
                    }
                    v
                }
                _ if col.auto_increment => {
                    self.next_id += 1;
                    Value::from(self.next_id)
                }
                _ => match &col.default {
                    Some(d) => Value::String(d.clone()),
                    None if col.not_null => {
                        return Err(engine(
                            ER_NO_DEFAULT,
                            format!("Field '{}' doesn't have a default value", col.name),
                        ))
                    }
                    None => Value::Null,
                },
            };
            row.insert(col.name.clone(), value);
        }
        Ok(row)
    }
}

#[derive(Debug, Clone)]
enum Stub {
    Rows(Vec<Row>),
    Affected(u64),
}

enum Outcome {
    Rows(Vec<Row>),
    Affected(u64),
}

#[derive(Debug)]
struct State {
    databases: BTreeMap<String, BTreeMap<String, FakeTable>>,
    current: String,
    log: Vec<String>,
    unprepared: Vec<String>,
    foreign_key_checks: bool,
    failures: Vec<(String, u16, String)>,
    stubs: Vec<(String, Stub)>,
    discarded: usize,
}

/// Shared in-memory database. Clones see the same state.
#[derive(Debug, Clone)]
pub struct FakeDatabase {
    state: Arc<Mutex<State>>,
}

impl Default for FakeDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeDatabase {
    /// Name of the default database.
    pub const DEFAULT_DATABASE: &'static str = "draw_db";

    /// A server with the system databases and an empty default database.
    pub fn new() -> Self {
        let mut databases = BTreeMap::new();
        for name in SYSTEM_DATABASES {
            databases.insert(name.to_string(), BTreeMap::new());
        }
        databases.insert(Self::DEFAULT_DATABASE.to_string(), BTreeMap::new());

        Self {
            state: Arc::new(Mutex::new(State {
                databases,
                current: Self::DEFAULT_DATABASE.to_string(),
                log: Vec::new(),
                unprepared: Vec::new(),
                foreign_key_checks: true,
                failures: Vec::new(),
                stubs: Vec::new(),
                discarded: 0,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -- fixtures -----------------------------------------------------------

    /// Create a table in the default database without logging the statement.
    /// Foreign keys may reference tables that do not exist yet.
    pub fn create(&self, def: TableDefinition) {
        self.create_in(Self::DEFAULT_DATABASE, def);
    }

    /// Create a table in `db` without logging the statement.
    pub fn create_in(&self, db: &str, def: TableDefinition) {
        let mut state = self.state();
        let previous_db = std::mem::replace(&mut state.current, db.to_string());
        let previous_checks = std::mem::replace(&mut state.foreign_key_checks, false);

        let result = state.run(&sql::create_table(&def), &[]);

        state.current = previous_db;
        state.foreign_key_checks = previous_checks;
        if let Err(err) = result {
            panic!("fixture table {} in {db}: {err}", def.name);
        }
    }

    pub fn add_database(&self, name: &str) {
        self.state()
            .databases
            .entry(name.to_string())
            .or_default();
    }

    /// Insert a row into a table of the default database without logging.
    /// `row` must be a JSON object.
    pub fn insert(&self, table: &str, row: Value) {
        let values: Vec<(String, Value)> = match row {
            Value::Object(map) => map.into_iter().collect(),
            other => panic!("fixture row must be an object, got {other}"),
        };
        let mut state = self.state();
        let result = state
            .table_mut(table)
            .and_then(|t| t.build_row(&values).map(|row| t.rows.push(row)));
        if let Err(err) = result {
            panic!("fixture row for {table}: {err}");
        }
    }

    /// Override the `Key` flag `SHOW COLUMNS` reports for a column.
    pub fn set_key_flag(&self, table: &str, column: &str, flag: &str) {
        let mut state = self.state();
        if let Ok(t) = state.table_mut(table) {
            if let Some(col) = t
                .columns
                .iter_mut()
                .find(|c| c.name.eq_ignore_ascii_case(column))
            {
                col.key_override = Some(flag.to_string());
            }
        }
    }

    /// Fail every statement containing `pattern` with the given error.
    pub fn fail_when(&self, pattern: &str, code: u16, message: &str) {
        self.state()
            .failures
            .push((pattern.to_string(), code, message.to_string()));
    }

    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    /// Answer statements starting with `prefix` (ignoring case) with `rows`.
    pub fn stub_rows(&self, prefix: &str, rows: Vec<Row>) {
        self.state()
            .stubs
            .push((prefix.to_string(), Stub::Rows(rows)));
    }

    /// Answer statements starting with `prefix` (ignoring case) with an affected count.
    pub fn stub_affected(&self, prefix: &str, affected: u64) {
        self.state()
            .stubs
            .push((prefix.to_string(), Stub::Affected(affected)));
    }

    // -- inspection ---------------------------------------------------------

    /// Every statement received, in order.
    pub fn statements(&self) -> Vec<String> {
        self.state().log.clone()
    }

    /// Received statements that change structure.
    pub fn ddl_statements(&self) -> Vec<String> {
        self.statements()
            .into_iter()
            .filter(|s| {
                let upper = s.trim_start().to_ascii_uppercase();
                ["CREATE ", "ALTER ", "DROP ", "RENAME "]
                    .iter()
                    .any(|p| upper.starts_with(p))
            })
            .collect()
    }

    /// Statements received over the unprepared path, in order.
    pub fn unprepared_statements(&self) -> Vec<String> {
        self.state().unprepared.clone()
    }

    pub fn clear_statements(&self) {
        let mut state = self.state();
        state.log.clear();
        state.unprepared.clear();
    }

    pub fn foreign_key_checks(&self) -> bool {
        self.state().foreign_key_checks
    }

    /// How many times a session was discarded instead of being released.
    pub fn discarded(&self) -> usize {
        self.state().discarded
    }

    /// Tables of the default database, sorted.
    pub fn table_names(&self) -> Vec<String> {
        self.tables_in(Self::DEFAULT_DATABASE)
    }

    /// Tables of `db`, sorted. Empty when the database does not exist.
    pub fn tables_in(&self, db: &str) -> Vec<String> {
        self.state()
            .databases
            .get(db)
            .map(|tables| tables.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn database_names(&self) -> Vec<String> {
        self.state().databases.keys().cloned().collect()
    }

    /// Column names of a default-database table, in order.
    pub fn columns_of(&self, table: &str) -> Vec<String> {
        self.state()
            .table(table)
            .map(|t| t.columns.iter().map(|c| c.name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn has_constraint(&self, table: &str, name: &str) -> bool {
        self.state()
            .table(table)
            .is_ok_and(|t| t.constraints.iter().any(|c| c.name == name))
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.state().table(table).map(|t| t.rows.len()).unwrap_or(0)
    }

    /// Rows of a default-database table as JSON objects.
    pub fn rows(&self, table: &str) -> Vec<Map<String, Value>> {
        self.state()
            .table(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Executor for FakeDatabase {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, DbError> {
        let mut state = self.state();
        state.log.push(sql.to_string());
        match state.run(sql, params)? {
            Outcome::Affected(n) => Ok(n),
            Outcome::Rows(rows) => Ok(rows.len() as u64),
        }
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DbError> {
        let mut state = self.state();
        state.log.push(sql.to_string());
        match state.run(sql, params)? {
            Outcome::Rows(rows) => Ok(rows),
            Outcome::Affected(_) => Ok(Vec::new()),
        }
    }

    async fn execute_unprepared(&self, sql: &str) -> Result<u64, DbError> {
        self.state().unprepared.push(sql.to_string());
        self.execute(sql, &[]).await
    }

    async fn query_unprepared(&self, sql: &str) -> Result<Vec<Row>, DbError> {
        self.state().unprepared.push(sql.to_string());
        self.query(sql, &[]).await
    }

    async fn session(&self) -> Result<Box<dyn Executor>, DbError> {
        Ok(Box::new(self.clone()))
    }

    fn discard(&self) {
        self.state().discarded += 1;
    }
}

impl State {
    fn run(&mut self, statement: &str, params: &[Value]) -> Result<Outcome, DbError> {
        if let Some((_, code, message)) = self
            .failures
            .iter()
            .find(|(pattern, _, _)| statement.contains(pattern.as_str()))
        {
            return Err(engine(*code, message.clone()));
        }

        let trimmed = statement.trim();
        let upper = trimmed.to_ascii_uppercase();

        if let Some((_, stub)) = self
            .stubs
            .iter()
            .find(|(prefix, _)| upper.starts_with(&prefix.to_ascii_uppercase()))
        {
            return Ok(match stub {
                Stub::Rows(rows) => Outcome::Rows(rows.clone()),
                Stub::Affected(n) => Outcome::Affected(*n),
            });
        }

        match trimmed {
            "SELECT 1" => return Ok(Outcome::Rows(vec![Row::new().with("1", 1)])),
            sql::SHOW_DATABASES => return Ok(Outcome::Rows(self.show_databases())),
            sql::TABLE_EXISTS => {
                let table = text_param(params, 0)?;
                let count = self
                    .databases
                    .get(&self.current)
                    .is_some_and(|tables| tables.contains_key(&table));
                return Ok(count_row(usize::from(count)));
            }
            sql::CONSTRAINT_EXISTS => {
                let name = text_param(params, 0)?;
                let table = text_param(params, 1)?;
                let count = self
                    .table(&table)
                    .map(|t| t.constraints.iter().filter(|c| c.name == name).count())
                    .unwrap_or(0);
                return Ok(count_row(count));
            }
            sql::FOREIGN_KEYS_CURRENT => {
                let table = text_param(params, 0)?;
                let db = self.current.clone();
                return Ok(Outcome::Rows(self.foreign_keys(&db, &table)));
            }
            sql::FOREIGN_KEYS_NAMED => {
                let db = text_param(params, 0)?;
                let table = text_param(params, 1)?;
                return Ok(Outcome::Rows(self.foreign_keys(&db, &table)));
            }
            sql::DISABLE_FOREIGN_KEY_CHECKS => {
                self.foreign_key_checks = false;
                return Ok(Outcome::Affected(0));
            }
            sql::ENABLE_FOREIGN_KEY_CHECKS => {
                self.foreign_key_checks = true;
                return Ok(Outcome::Affected(0));
            }
            _ => {}
        }

        let idents = parse_idents(trimmed);

        if upper.starts_with("SHOW TABLES") {
            let db = idents.first().cloned().unwrap_or_else(|| self.current.clone());
            self.show_tables(&db)
        } else if upper.starts_with("SHOW COLUMNS FROM") {
            let table = ident_at(&idents, 0, trimmed)?;
            let db = idents.get(1).cloned().unwrap_or_else(|| self.current.clone());
            self.show_columns(&db, &table)
        } else if upper.starts_with("CREATE TABLE") {
            self.create_table(trimmed, upper.starts_with("CREATE TABLE IF NOT EXISTS"))
        } else if upper.starts_with("ALTER TABLE") {
            self.alter_table(trimmed)
        } else if upper.starts_with("DROP TABLE") {
            let table = ident_at(&idents, 0, trimmed)?;
            let current = self.current.clone();
            self.database_mut(&current)?.remove(&table);
            Ok(Outcome::Affected(0))
        } else if upper.starts_with("CREATE DATABASE") {
            let name = ident_at(&idents, 0, trimmed)?;
            self.databases.entry(name).or_default();
            Ok(Outcome::Affected(1))
        } else if upper.starts_with("DROP DATABASE") {
            let name = ident_at(&idents, 0, trimmed)?;
            let dropped = self.databases.remove(&name).map(|t| t.len()).unwrap_or(0);
            Ok(Outcome::Affected(dropped as u64))
        } else if upper.starts_with("RENAME TABLE") {
            self.rename_table(&idents, trimmed)
        } else if upper.starts_with("SELECT COUNT(*) FROM") {
            let table = ident_at(&idents, 0, trimmed)?;
            Ok(count_row(self.table(&table)?.rows.len()))
        } else if upper.starts_with("SELECT * FROM") {
            let table = ident_at(&idents, 0, trimmed)?;
            self.select_page(&table, params)
        } else if upper.starts_with("SELECT `") {
            self.select_columns(&idents, trimmed)
        } else if upper.starts_with("INSERT INTO") || upper.starts_with("REPLACE INTO") {
            self.insert(&idents, params, upper.starts_with("REPLACE"), trimmed)
        } else if upper.starts_with("DELETE FROM") {
            self.delete(&idents, params, trimmed)
        } else {
            Err(engine(
                ER_PARSE_ERROR,
                format!("fake database cannot interpret: {trimmed}"),
            ))
        }
    }

    // -- lookup -------------------------------------------------------------

    fn database(&self, db: &str) -> Result<&BTreeMap<String, FakeTable>, DbError> {
        self.databases
            .get(db)
            .ok_or_else(|| engine(ER_BAD_DB_ERROR, format!("Unknown database '{db}'")))
    }

    fn database_mut(&mut self, db: &str) -> Result<&mut BTreeMap<String, FakeTable>, DbError> {
        self.databases
            .get_mut(db)
            .ok_or_else(|| engine(ER_BAD_DB_ERROR, format!("Unknown database '{db}'")))
    }

    fn table_in(&self, db: &str, table: &str) -> Result<&FakeTable, DbError> {
        self.database(db)?
            .get(table)
            .ok_or_else(|| missing_table(db, table))
    }

    fn table(&self, table: &str) -> Result<&FakeTable, DbError> {
        self.table_in(&self.current, table)
    }

    fn table_mut(&mut self, table: &str) -> Result<&mut FakeTable, DbError> {
        let db = self.current.clone();
        self.database_mut(&db)?
            .get_mut(table)
            .ok_or_else(|| missing_table(&db, table))
    }

    // -- catalog ------------------------------------------------------------

    fn show_databases(&self) -> Vec<Row> {
        self.databases
            .keys()
            .map(|name| Row::new().with("Database", name.as_str()))
            .collect()
    }

    fn show_tables(&self, db: &str) -> Result<Outcome, DbError> {
        let header = format!("Tables_in_{db}");
        Ok(Outcome::Rows(
            self.database(db)?
                .keys()
                .map(|name| Row::new().with(header.as_str(), name.as_str()))
                .collect(),
        ))
    }

    fn show_columns(&self, db: &str, table: &str) -> Result<Outcome, DbError> {
        let t = self.table_in(db, table)?;
        Ok(Outcome::Rows(
            t.columns
                .iter()
                .map(|col| {
                    let nullable = !(col.not_null || col.primary_key);
                    Row::new()
                        .with("Field", col.name.as_str())
                        .with("Type", col.column_type.as_str())
                        .with("Null", if nullable { "YES" } else { "NO" })
                        .with("Key", t.key_flag(col))
                        .with(
                            "Default",
                            col.default.clone().map(Value::String).unwrap_or(Value::Null),
                        )
                        .with(
                            "Extra",
                            if col.auto_increment { "auto_increment" } else { "" },
                        )
                })
                .collect(),
        ))
    }

    fn foreign_keys(&self, db: &str, table: &str) -> Vec<Row> {
        let Ok(t) = self.table_in(db, table) else {
            return Vec::new();
        };
        let mut constraints: Vec<&FakeConstraint> = t.constraints.iter().collect();
        constraints.sort_by(|a, b| a.name.cmp(&b.name));
        constraints
            .into_iter()
            .map(|c| {
                Row::new()
                    .with("TABLE_NAME", table)
                    .with("COLUMN_NAME", c.column.as_str())
                    .with("REFERENCED_TABLE_NAME", c.ref_table.as_str())
                    .with("REFERENCED_COLUMN_NAME", c.ref_column.as_str())
            })
            .collect()
    }

    // -- DDL ----------------------------------------------------------------

    fn create_table(&mut self, statement: &str, if_not_exists: bool) -> Result<Outcome, DbError> {
        let (name, rest) = take_ident(statement)
            .ok_or_else(|| engine(ER_PARSE_ERROR, format!("no table name: {statement}")))?;
        let current = self.current.clone();
        if self.database(&current)?.contains_key(&name) {
            if if_not_exists {
                return Ok(Outcome::Affected(0));
            }
            return Err(engine(
                ER_TABLE_EXISTS,
                format!("Table '{name}' already exists"),
            ));
        }

        let body = rest
            .trim()
            .strip_prefix('(')
            .and_then(|b| b.strip_suffix(')'))
            .ok_or_else(|| engine(ER_PARSE_ERROR, format!("no column list: {statement}")))?;

        let mut table = FakeTable::default();
        let mut pending = Vec::new();
        for part in split_top_level(body) {
            let part_upper = part.to_ascii_uppercase();
            if part_upper.starts_with("PRIMARY KEY") {
                for pk in parse_idents(part) {
                    if let Some(col) = table.columns.iter_mut().find(|c| c.name == pk) {
                        col.primary_key = true;
                        col.not_null = true;
                    }
                }
            } else if part_upper.starts_with("CONSTRAINT") {
                pending.push(parse_constraint(part)?);
            } else {
                let col = parse_column(part)?;
                if table.column(&col.name).is_some() {
                    return Err(duplicate_column(&col.name));
                }
                table.columns.push(col);
            }
        }

        for constraint in pending {
            self.check_constraint(&name, &table, &constraint, &name)?;
            table.constraints.push(constraint);
        }

        self.database_mut(&current)?.insert(name, table);
        Ok(Outcome::Affected(0))
    }

    fn alter_table(&mut self, statement: &str) -> Result<Outcome, DbError> {
        let (name, rest) = take_ident(statement)
            .ok_or_else(|| engine(ER_PARSE_ERROR, format!("no table name: {statement}")))?;
        let rest = rest.trim();
        let rest_upper = rest.to_ascii_uppercase();

        if rest_upper.starts_with("ADD COLUMN ") {
            let col = parse_column(&rest["ADD COLUMN ".len()..])?;
            let t = self.table_mut(&name)?;
            if t.column(&col.name).is_some() {
                return Err(duplicate_column(&col.name));
            }
            let fill = col.default.clone().map(Value::String).unwrap_or(Value::Null);
            for row in &mut t.rows {
                row.insert(col.name.clone(), fill.clone());
            }
            t.columns.push(col);
            Ok(Outcome::Affected(0))
        } else if rest_upper.starts_with("ADD CONSTRAINT") {
            let constraint = parse_constraint(&rest["ADD ".len()..])?;
            let owner = self.table(&name)?;
            self.check_constraint(&name, owner, &constraint, "")?;
            self.table_mut(&name)?.constraints.push(constraint);
            Ok(Outcome::Affected(0))
        } else {
            Err(engine(
                ER_PARSE_ERROR,
                format!("fake database cannot interpret: {statement}"),
            ))
        }
    }

    /// `creating` names a table that is being created and may be referenced
    /// by its own constraints.
    fn check_constraint(
        &self,
        table: &str,
        owner: &FakeTable,
        constraint: &FakeConstraint,
        creating: &str,
    ) -> Result<(), DbError> {
        if owner.column(&constraint.column).is_none() {
            return Err(engine(
                ER_KEY_COLUMN_DOES_NOT_EXIST,
                format!(
                    "Key column '{}' doesn't exist in table",
                    constraint.column
                ),
            ));
        }

        let tables = self.database(&self.current)?;
        let duplicate = tables
            .values()
            .flat_map(|t| t.constraints.iter())
            .any(|c| c.name == constraint.name);
        if duplicate {
            return Err(engine(
                ER_FK_DUP_NAME,
                format!(
                    "Duplicate foreign key constraint name '{}'",
                    constraint.name
                ),
            ));
        }

        let parent_exists =
            constraint.ref_table == creating || tables.contains_key(&constraint.ref_table);
        if self.foreign_key_checks && !parent_exists {
            return Err(engine(
                ER_FK_CANNOT_OPEN_PARENT,
                format!(
                    "Failed to open the referenced table '{}' for constraint on '{table}'",
                    constraint.ref_table
                ),
            ));
        }
        Ok(())
    }

    fn rename_table(&mut self, idents: &[String], statement: &str) -> Result<Outcome, DbError> {
        let from_db = ident_at(idents, 0, statement)?;
        let from = ident_at(idents, 1, statement)?;
        let to_db = ident_at(idents, 2, statement)?;
        let to = ident_at(idents, 3, statement)?;

        self.database(&to_db)?;
        let table = self
            .database_mut(&from_db)?
            .remove(&from)
            .ok_or_else(|| missing_table(&from_db, &from))?;
        self.database_mut(&to_db)?.insert(to, table);
        Ok(Outcome::Affected(0))
    }

    // -- rows ---------------------------------------------------------------

    fn select_page(&self, table: &str, params: &[Value]) -> Result<Outcome, DbError> {
        let t = self.table(table)?;
        let limit = params.first().and_then(as_i64).unwrap_or(i64::MAX);
        let offset = params.get(1).and_then(as_i64).unwrap_or(0);
        let rows = t
            .rows
            .iter()
            .skip(usize::try_from(offset).unwrap_or(0))
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .map(|row| project(t, row, None))
            .collect();
        Ok(Outcome::Rows(rows))
    }

    fn select_columns(&self, idents: &[String], statement: &str) -> Result<Outcome, DbError> {
        let Some((table, columns)) = idents.split_last() else {
            return Err(engine(ER_PARSE_ERROR, format!("no table: {statement}")));
        };
        let t = self.table(table)?;
        for name in columns {
            if t.column(name).is_none() {
                return Err(engine(
                    ER_BAD_FIELD,
                    format!("Unknown column '{name}' in 'field list'"),
                ));
            }
        }
        Ok(Outcome::Rows(
            t.rows
                .iter()
                .map(|row| project(t, row, Some(columns)))
                .collect(),
        ))
    }

    fn insert(
        &mut self,
        idents: &[String],
        params: &[Value],
        replace: bool,
        statement: &str,
    ) -> Result<Outcome, DbError> {
        let table = ident_at(idents, 0, statement)?;
        let columns = &idents[1..];
        if columns.len() != params.len() {
            return Err(engine(
                ER_WRONG_VALUE_COUNT,
                "Column count doesn't match value count at row 1".to_string(),
            ));
        }
        let values: Vec<(String, Value)> = columns
            .iter()
            .cloned()
            .zip(params.iter().cloned())
            .collect();

        let t = self.table_mut(&table)?;
        let row = t.build_row(&values)?;

        let mut affected = 1;
        if replace && t.columns.iter().any(|c| c.primary_key) {
            let key: Vec<&str> = t
                .columns
                .iter()
                .filter(|c| c.primary_key)
                .map(|c| c.name.as_str())
                .collect();
            let before = t.rows.len();
            t.rows
                .retain(|existing| !key.iter().all(|k| loose_eq(&existing[*k], &row[*k])));
            affected += (before - t.rows.len()) as u64;
        }
        t.rows.push(row);
        Ok(Outcome::Affected(affected))
    }

    fn delete(
        &mut self,
        idents: &[String],
        params: &[Value],
        statement: &str,
    ) -> Result<Outcome, DbError> {
        let table = ident_at(idents, 0, statement)?;
        let columns = &idents[1..];
        let t = self.table_mut(&table)?;
        let mut keys = Vec::with_capacity(columns.len());
        for name in columns {
            let col = t.column(name).ok_or_else(|| {
                engine(
                    ER_BAD_FIELD,
                    format!("Unknown column '{name}' in 'where clause'"),
                )
            })?;
            keys.push(col.name.clone());
        }

        let before = t.rows.len();
        t.rows.retain(|row| {
            !keys
                .iter()
                .zip(params)
                .all(|(k, v)| row.get(k).is_some_and(|cell| null_safe_eq(cell, v)))
        });
        Ok(Outcome::Affected((before - t.rows.len()) as u64))
    }
}

fn project(t: &FakeTable, row: &Map<String, Value>, only: Option<&[String]>) -> Row {
    let mut out = Row::new();
    for col in &t.columns {
        if only.is_some_and(|names| !names.iter().any(|n| n.eq_ignore_ascii_case(&col.name))) {
            continue;
        }
        out.push(col.name.as_str(), row.get(&col.name).cloned().unwrap_or(Value::Null));
    }
    out
}

fn count_row(count: usize) -> Outcome {
    Outcome::Rows(vec![Row::new().with("COUNT(*)", count as u64)])
}

fn engine(code: u16, message: String) -> DbError {
    DbError::Engine { code, message }
}

fn missing_table(db: &str, table: &str) -> DbError {
    engine(
        ER_NO_SUCH_TABLE,
        format!("Table '{db}.{table}' doesn't exist"),
    )
}

fn duplicate_column(name: &str) -> DbError {
    engine(ER_DUP_FIELDNAME, format!("Duplicate column name '{name}'"))
}

fn ident_at(idents: &[String], idx: usize, statement: &str) -> Result<String, DbError> {
    idents
        .get(idx)
        .cloned()
        .ok_or_else(|| engine(ER_PARSE_ERROR, format!("missing identifier: {statement}")))
}

fn text_param(params: &[Value], idx: usize) -> Result<String, DbError> {
    match params.get(idx) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Ok(other.to_string()),
        None => Err(engine(
            ER_PARSE_ERROR,
            format!("missing parameter #{}", idx + 1),
        )),
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Equality across JSON representations: `1` matches `"1"`.
fn loose_eq(a: &Value, b: &Value) -> bool {
    a == b || (!a.is_null() && !b.is_null() && cell_text(a) == cell_text(b))
}

/// `<=>` semantics: `NULL` equals `NULL`.
fn null_safe_eq(cell: &Value, param: &Value) -> bool {
    match (cell.is_null(), param.is_null()) {
        (true, true) => true,
        (false, false) => loose_eq(cell, param),
        _ => false,
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// -- parsing ------------------------------------------------------------------

/// Every backtick-quoted identifier in order, skipping string literals.
fn parse_idents(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' => skip_literal(&mut chars),
            '`' => out.push(read_ident(&mut chars)),
            _ => {}
        }
    }
    out
}

fn read_ident(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut ident = String::new();
    while let Some(c) = chars.next() {
        if c == '`' {
            if chars.peek() == Some(&'`') {
                chars.next();
                ident.push('`');
            } else {
                break;
            }
        } else {
            ident.push(c);
        }
    }
    ident
}

fn skip_literal(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) {
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '\'' if chars.peek() == Some(&'\'') => {
                chars.next();
            }
            '\'' => break,
            _ => {}
        }
    }
}

/// The first backtick-quoted identifier and the text after it.
fn take_ident(s: &str) -> Option<(String, &str)> {
    let start = s.find('`')?;
    let bytes = s.as_bytes();
    let mut idx = start + 1;
    while idx < bytes.len() {
        if bytes[idx] == b'`' {
            if bytes.get(idx + 1) == Some(&b'`') {
                idx += 2;
                continue;
            }
            let ident = s[start + 1..idx].replace("``", "`");
            return Some((ident, &s[idx + 1..]));
        }
        idx += 1;
    }
    None
}

/// Split on commas outside parentheses, identifiers and literals.
fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut in_ident = false;
    let mut in_literal = false;
    let mut escaped = false;
    let mut start = 0;

    for (idx, c) in s.char_indices() {
        if in_literal {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '\'' => in_literal = false,
                _ => {}
            }
            continue;
        }
        match c {
            '`' => in_ident = !in_ident,
            '\'' if !in_ident => in_literal = true,
            '(' if !in_ident => depth += 1,
            ')' if !in_ident => depth = depth.saturating_sub(1),
            ',' if !in_ident && depth == 0 => {
                parts.push(s[start..idx].trim());
                start = idx + 1;
            }
            _ => {}
        }
    }
    let last = s[start..].trim();
    if !last.is_empty() {
        parts.push(last);
    }
    parts
}

/// `` `name` TYPE [NOT NULL] [AUTO_INCREMENT] [DEFAULT v] [PRIMARY KEY] ``
fn parse_column(def: &str) -> Result<FakeColumn, DbError> {
    let (name, rest) = take_ident(def)
        .ok_or_else(|| engine(ER_PARSE_ERROR, format!("no column name: {def}")))?;
    let rest = rest.trim();
    let upper = rest.to_ascii_uppercase();

    let markers = [" NOT NULL", " AUTO_INCREMENT", " DEFAULT ", " PRIMARY KEY"];
    let type_end = markers
        .iter()
        .filter_map(|m| upper.find(m))
        .min()
        .unwrap_or(rest.len());
    let column_type = rest[..type_end].trim().to_ascii_lowercase();
    if column_type.is_empty() {
        return Err(engine(ER_PARSE_ERROR, format!("no column type: {def}")));
    }

    let default = upper
        .find(" DEFAULT ")
        .map(|idx| parse_default(&rest[idx + " DEFAULT ".len()..]));
    let primary_key = upper.contains(" PRIMARY KEY");

    Ok(FakeColumn {
        name,
        column_type,
        not_null: upper.contains(" NOT NULL") || primary_key,
        primary_key,
        auto_increment: upper.contains(" AUTO_INCREMENT"),
        default: default.flatten(),
        key_override: None,
    })
}

fn parse_default(raw: &str) -> Option<String> {
    let raw = raw.trim_start();
    if let Some(body) = raw.strip_prefix('\'') {
        let mut value = String::new();
        let mut chars = body.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '\\' => value.extend(chars.next()),
                '\'' if chars.peek() == Some(&'\'') => {
                    chars.next();
                    value.push('\'');
                }
                '\'' => break,
                other => value.push(other),
            }
        }
        return Some(value);
    }
    let token = raw.split_whitespace().next().unwrap_or_default();
    if token.eq_ignore_ascii_case("NULL") {
        None
    } else {
        Some(token.to_string())
    }
}

/// `` CONSTRAINT `n` FOREIGN KEY (`c`) REFERENCES `t`(`r`) ... ``
fn parse_constraint(def: &str) -> Result<FakeConstraint, DbError> {
    match parse_idents(def).as_slice() {
        [name, column, ref_table, ref_column, ..] => Ok(FakeConstraint {
            name: name.clone(),
            column: column.clone(),
            ref_table: ref_table.clone(),
            ref_column: ref_column.clone(),
        }),
        _ => Err(engine(
            ER_PARSE_ERROR,
            format!("malformed constraint: {def}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ColumnDefinition, ForeignKeyDefinition};
    use serde_json::json;

    #[test]
    fn test_split_top_level() {
        assert_eq!(
            split_top_level("`a` DECIMAL(10,2), `b` VARCHAR(5) DEFAULT 'x,y', PRIMARY KEY (`a`, `b`)"),
            vec![
                "`a` DECIMAL(10,2)",
                "`b` VARCHAR(5) DEFAULT 'x,y'",
                "PRIMARY KEY (`a`, `b`)"
            ]
        );
    }

    #[test]
    fn test_parse_column() {
        let col = parse_column("`we``ird` VARCHAR(20) NOT NULL DEFAULT 'it''s'").unwrap();
        assert_eq!(col.name, "we`ird");
        assert_eq!(col.column_type, "varchar(20)");
        assert!(col.not_null);
        assert_eq!(col.default.as_deref(), Some("it's"));
    }

    #[tokio::test]
    async fn test_create_insert_select() {
        let fake = FakeDatabase::new();
        fake.create(
            TableDefinition::new("users")
                .with_column(ColumnDefinition::new("id", "INT").primary_key().auto_increment())
                .with_column(ColumnDefinition::new("name", "TEXT")),
        );

        let n = fake
            .execute(&sql::insert("users", &["name"]), &[json!("ada")])
            .await
            .unwrap();
        assert_eq!(n, 1);

        let rows = fake
            .query(&sql::select_page("users"), &[json!(10), json!(0)])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("id"), Some(&json!(1)));
        assert_eq!(rows[0].get_str("name"), Some("ada"));
    }

    #[tokio::test]
    async fn test_foreign_key_checks_enforced() {
        let fake = FakeDatabase::new();
        let def = TableDefinition::new("orders")
            .with_column(ColumnDefinition::new("user_id", "INT"))
            .with_foreign_key(ForeignKeyDefinition::new("user_id", "users", "id"));

        let err = fake
            .execute(&sql::create_table(&def), &[])
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(ER_FK_CANNOT_OPEN_PARENT));

        fake.execute(sql::DISABLE_FOREIGN_KEY_CHECKS, &[])
            .await
            .unwrap();
        fake.execute(&sql::create_table(&def), &[]).await.unwrap();
        assert!(fake.has_constraint("orders", "fk_orders_user_id"));
    }

    #[tokio::test]
    async fn test_foreign_key_on_missing_column() {
        let fake = FakeDatabase::new();
        fake.execute(sql::DISABLE_FOREIGN_KEY_CHECKS, &[])
            .await
            .unwrap();
        let def = TableDefinition::new("orders")
            .with_column(ColumnDefinition::new("id", "INT"))
            .with_foreign_key(ForeignKeyDefinition::new("ghost_id", "users", "id"));

        let err = fake
            .execute(&sql::create_table(&def), &[])
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(ER_KEY_COLUMN_DOES_NOT_EXIST));
        assert!(fake.table_names().is_empty());

        fake.create(TableDefinition::new("orders").with_column(ColumnDefinition::new("id", "INT")));
        let fk = ForeignKeyDefinition::new("ghost_id", "users", "id");
        let err = fake
            .execute(&sql::add_foreign_key("orders", &fk), &[])
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(ER_KEY_COLUMN_DOES_NOT_EXIST));
        assert!(!fake.has_constraint("orders", "fk_orders_ghost_id"));
    }

    #[tokio::test]
    async fn test_unknown_statement_is_rejected_unless_stubbed() {
        let fake = FakeDatabase::new();
        let err = fake.query("SELECT NOW()", &[]).await.unwrap_err();
        assert_eq!(err.code(), Some(ER_PARSE_ERROR));

        fake.stub_rows("select now()", vec![Row::new().with("NOW()", "2024-01-01")]);
        let rows = fake.query("SELECT NOW()", &[]).await.unwrap();
        assert_eq!(rows[0].get_str("NOW()"), Some("2024-01-01"));
    }
}
