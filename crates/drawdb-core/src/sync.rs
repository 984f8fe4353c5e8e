//! Table reconciliation.
//!
//! [`Reconciler::sync`] converges one live table towards a
//! [`TableDefinition`] using additive DDL only: create the table when it is
//! absent, otherwise add the missing columns and foreign keys. Nothing is
//! ever dropped, renamed or retyped.
//!
//! The statements of one sync are not transactional (MySQL commits DDL
//! implicitly). When a statement fails, the earlier ones stay applied and the
//! error names the statement that failed.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::exec::Executor;
use crate::metadata::{MetadataReader, SchemaScope};
use crate::model::TableDefinition;
use crate::naming::{foreign_key_name, ConstraintChecker};
use crate::sql;

/// What a sync changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    /// The table did not exist and was created.
    pub created: bool,
    /// Columns added (all declared columns when `created`).
    pub added_columns: Vec<String>,
    /// Foreign key constraint names added.
    pub added_foreign_keys: Vec<String>,
    /// Statements executed, in order. Excludes session variable changes.
    pub statements: Vec<String>,
}

impl SyncOutcome {
    /// True when the live table already matched.
    pub fn is_noop(&self) -> bool {
        self.statements.is_empty()
    }
}

/// Create-or-alter engine.
pub struct Reconciler {
    db: Arc<dyn Executor>,
}

impl Reconciler {
    pub fn new(db: Arc<dyn Executor>) -> Self {
        Self { db }
    }

    /// Converge the live table named by `def` towards `def`.
    pub async fn sync(&self, def: &TableDefinition) -> Result<SyncOutcome> {
        validate(def)?;

        // FOREIGN_KEY_CHECKS is per connection: every statement below must
        // share the session that changed it.
        let session = self
            .db
            .session()
            .await
            .map_err(Error::query("acquire connection"))?;
        let db = session.as_ref();

        let exists = MetadataReader::new(db).table_exists(&def.name).await?;
        info!(table = %def.name, exists, "Synchronizing table");

        let guard = ForeignKeyChecksGuard::suspend(db).await?;
        let mut outcome = SyncOutcome::default();

        let result = if exists {
            alter_table(db, def, &mut outcome).await
        } else {
            create_table(db, def, &mut outcome).await
        };

        match result {
            Ok(()) => {
                if let Err(err) = guard.restore().await {
                    warn!(
                        table = %def.name,
                        applied = ?outcome.statements,
                        "Changes applied but foreign key checks not restored"
                    );
                    return Err(err);
                }
                info!(
                    table = %def.name,
                    created = outcome.created,
                    added_columns = outcome.added_columns.len(),
                    added_foreign_keys = outcome.added_foreign_keys.len(),
                    "Table synchronized"
                );
                Ok(outcome)
            }
            Err(err) => {
                if !outcome.statements.is_empty() {
                    warn!(
                        table = %def.name,
                        applied = ?outcome.statements,
                        "Sync failed after partial changes"
                    );
                }
                if let Err(restore_err) = guard.restore().await {
                    warn!(error = %restore_err, "Failed to restore foreign key checks");
                }
                Err(err)
            }
        }
    }
}

async fn create_table(
    db: &dyn Executor,
    def: &TableDefinition,
    outcome: &mut SyncOutcome,
) -> Result<()> {
    apply(db, outcome, sql::create_table(def)).await?;
    outcome.created = true;
    outcome.added_columns = def.columns.iter().map(|c| c.name.clone()).collect();
    outcome.added_foreign_keys = def
        .foreign_keys
        .iter()
        .map(|fk| foreign_key_name(&def.name, &fk.column_name))
        .collect();
    Ok(())
}

async fn alter_table(
    db: &dyn Executor,
    def: &TableDefinition,
    outcome: &mut SyncOutcome,
) -> Result<()> {
    let live: HashSet<String> = MetadataReader::new(db)
        .columns(SchemaScope::Current, &def.name)
        .await?
        .into_iter()
        .map(|c| c.name.to_ascii_lowercase())
        .collect();

    for col in &def.columns {
        if live.contains(&col.name.to_ascii_lowercase()) {
            continue;
        }
        apply(db, outcome, sql::add_column(&def.name, col)).await?;
        outcome.added_columns.push(col.name.clone());
    }

    let checker = ConstraintChecker::new(db);
    for fk in &def.foreign_keys {
        let name = foreign_key_name(&def.name, &fk.column_name);
        if checker.exists(&def.name, &name).await? {
            continue;
        }
        apply(db, outcome, sql::add_foreign_key(&def.name, fk)).await?;
        outcome.added_foreign_keys.push(name);
    }

    Ok(())
}

async fn apply(db: &dyn Executor, outcome: &mut SyncOutcome, statement: String) -> Result<()> {
    debug!(sql = %statement, "Executing DDL");
    db.execute(&statement, &[])
        .await
        .map_err(Error::ddl(statement.as_str()))?;
    outcome.statements.push(statement);
    Ok(())
}

/// Reject definitions that cannot produce valid DDL. Runs before any
/// database access.
pub fn validate(def: &TableDefinition) -> Result<()> {
    if def.name.trim().is_empty() {
        return Err(Error::Validation("table name is required".into()));
    }
    if def.columns.is_empty() {
        return Err(Error::Validation(format!(
            "table {} must have at least one column",
            def.name
        )));
    }

    let mut seen = HashSet::new();
    for (idx, col) in def.columns.iter().enumerate() {
        if col.name.trim().is_empty() {
            return Err(Error::Validation(format!("column #{} has no name", idx + 1)));
        }
        if col.column_type.trim().is_empty() {
            return Err(Error::Validation(format!("column {} has no type", col.name)));
        }
        if col.column_type.contains(';') {
            return Err(Error::Validation(format!(
                "column {} has an invalid type {:?}",
                col.name, col.column_type
            )));
        }
        if !seen.insert(col.name.to_ascii_lowercase()) {
            return Err(Error::Validation(format!("duplicate column {}", col.name)));
        }
    }

    let mut fk_columns = HashSet::new();
    for fk in &def.foreign_keys {
        if fk.column_name.trim().is_empty()
            || fk.ref_table_name.trim().is_empty()
            || fk.ref_column_name.trim().is_empty()
        {
            return Err(Error::Validation(format!(
                "foreign key on {} needs a column, a referenced table and a referenced column",
                def.name
            )));
        }
        if !seen.contains(&fk.column_name.to_ascii_lowercase()) {
            return Err(Error::Validation(format!(
                "foreign key column {} is not a column of {}",
                fk.column_name, def.name
            )));
        }
        if !fk_columns.insert(fk.column_name.to_ascii_lowercase()) {
            return Err(Error::Validation(format!(
                "column {} has more than one foreign key",
                fk.column_name
            )));
        }
    }

    Ok(())
}

/// Holds `FOREIGN_KEY_CHECKS=0` on a session.
///
/// [`restore`](Self::restore) re-enables the checks. A guard dropped while
/// still armed cannot run the statement, so it discards the connection
/// instead and the pool never hands it out with checks disabled.
struct ForeignKeyChecksGuard<'a> {
    session: &'a dyn Executor,
    armed: bool,
}

impl<'a> ForeignKeyChecksGuard<'a> {
    async fn suspend(session: &'a dyn Executor) -> Result<Self> {
        session
            .execute(sql::DISABLE_FOREIGN_KEY_CHECKS, &[])
            .await
            .map_err(Error::ddl(sql::DISABLE_FOREIGN_KEY_CHECKS))?;
        Ok(Self {
            session,
            armed: true,
        })
    }

    async fn restore(mut self) -> Result<()> {
        self.session
            .execute(sql::ENABLE_FOREIGN_KEY_CHECKS, &[])
            .await
            .map_err(Error::ddl(sql::ENABLE_FOREIGN_KEY_CHECKS))?;
        self.armed = false;
        Ok(())
    }
}

impl Drop for ForeignKeyChecksGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("Foreign key checks not restored, discarding connection");
            self.session.discard();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ColumnDefinition, ForeignKeyDefinition};
    use crate::testing::FakeDatabase;

    fn reconciler(fake: &FakeDatabase) -> Reconciler {
        Reconciler::new(Arc::new(fake.clone()))
    }

    #[tokio::test]
    async fn test_validation_runs_before_database_access() {
        let fake = FakeDatabase::new();
        let rec = reconciler(&fake);

        let cases = vec![
            TableDefinition::new("").with_column(ColumnDefinition::new("id", "INT")),
            TableDefinition::new("empty"),
            TableDefinition::new("t").with_column(ColumnDefinition::new("", "INT")),
            TableDefinition::new("t").with_column(ColumnDefinition::new("id", " ")),
            TableDefinition::new("t")
                .with_column(ColumnDefinition::new("id", "INT"))
                .with_column(ColumnDefinition::new("ID", "INT")),
            TableDefinition::new("t")
                .with_column(ColumnDefinition::new("a", "INT"))
                .with_foreign_key(ForeignKeyDefinition::new("a", "", "id")),
            TableDefinition::new("t")
                .with_column(ColumnDefinition::new("a", "INT"))
                .with_foreign_key(ForeignKeyDefinition::new("a", "x", "id"))
                .with_foreign_key(ForeignKeyDefinition::new("a", "y", "id")),
            TableDefinition::new("orders")
                .with_column(ColumnDefinition::new("id", "INT"))
                .with_foreign_key(ForeignKeyDefinition::new("ghost_id", "users", "id")),
            TableDefinition::new("t")
                .with_column(ColumnDefinition::new("a", "INT); DROP TABLE users; --")),
        ];

        for def in cases {
            let err = rec.sync(&def).await.unwrap_err();
            assert!(err.is_caller_error(), "{def:?} gave {err}");
        }
        assert!(fake.statements().is_empty());
    }

    #[tokio::test]
    async fn test_create_then_noop() {
        let fake = FakeDatabase::new();
        let rec = reconciler(&fake);
        let def = TableDefinition::new("users")
            .with_column(ColumnDefinition::new("id", "INT").primary_key().auto_increment())
            .with_column(ColumnDefinition::new("email", "VARCHAR").with_length(255));

        let first = rec.sync(&def).await.unwrap();
        assert!(first.created);
        assert_eq!(first.added_columns, vec!["id", "email"]);
        assert_eq!(
            first.statements,
            vec!["CREATE TABLE `users` (`id` INT AUTO_INCREMENT, `email` VARCHAR(255), PRIMARY KEY (`id`))"]
        );

        let second = rec.sync(&def).await.unwrap();
        assert!(!second.created);
        assert!(second.is_noop());
        assert!(fake.foreign_key_checks());
    }

    #[tokio::test]
    async fn test_session_variables_wrap_ddl() {
        let fake = FakeDatabase::new();
        let rec = reconciler(&fake);
        let def = TableDefinition::new("t").with_column(ColumnDefinition::new("id", "INT"));

        rec.sync(&def).await.unwrap();

        let log = fake.statements();
        let disable = log
            .iter()
            .position(|s| s == sql::DISABLE_FOREIGN_KEY_CHECKS)
            .unwrap();
        let create = log.iter().position(|s| s.starts_with("CREATE TABLE")).unwrap();
        let enable = log
            .iter()
            .position(|s| s == sql::ENABLE_FOREIGN_KEY_CHECKS)
            .unwrap();
        assert!(disable < create && create < enable);
    }

    #[tokio::test]
    async fn test_failed_create_restores_checks() {
        let fake = FakeDatabase::new();
        fake.fail_when("CREATE TABLE", 1064, "You have an error in your SQL syntax");
        let rec = reconciler(&fake);
        let def = TableDefinition::new("t").with_column(ColumnDefinition::new("id", "BOGUS"));

        let err = rec.sync(&def).await.unwrap_err();
        match err {
            Error::Ddl { statement, source } => {
                assert!(statement.starts_with("CREATE TABLE `t`"));
                assert_eq!(source.code(), Some(1064));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(fake.foreign_key_checks());
        assert_eq!(fake.discarded(), 0);
    }

    #[tokio::test]
    async fn test_foreign_key_column_matches_ignoring_case() {
        let fake = FakeDatabase::new();
        let def = TableDefinition::new("orders")
            .with_column(ColumnDefinition::new("User_Id", "INT"))
            .with_foreign_key(ForeignKeyDefinition::new("user_id", "users", "id"));

        assert!(validate(&def).is_ok());
        reconciler(&fake).sync(&def).await.unwrap();
        assert!(fake.has_constraint("orders", "fk_orders_user_id"));
    }

    #[tokio::test]
    async fn test_failed_restore_after_changes() {
        let fake = FakeDatabase::new();
        fake.fail_when(sql::ENABLE_FOREIGN_KEY_CHECKS, 2013, "Lost connection to MySQL server");
        let def = TableDefinition::new("t").with_column(ColumnDefinition::new("id", "INT"));

        let err = reconciler(&fake).sync(&def).await.unwrap_err();
        match err {
            Error::Ddl { statement, .. } => assert_eq!(statement, sql::ENABLE_FOREIGN_KEY_CHECKS),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(fake.table_names(), vec!["t"]);
        assert_eq!(fake.discarded(), 1);
    }

    #[tokio::test]
    async fn test_dropped_guard_discards_session() {
        let fake = FakeDatabase::new();
        {
            let _guard = ForeignKeyChecksGuard::suspend(&fake).await.unwrap();
            assert!(!fake.foreign_key_checks());
        }
        assert_eq!(fake.discarded(), 1);

        let guard = ForeignKeyChecksGuard::suspend(&fake).await.unwrap();
        guard.restore().await.unwrap();
        assert_eq!(fake.discarded(), 1);
        assert!(fake.foreign_key_checks());
    }

    #[tokio::test]
    async fn test_column_match_ignores_case() {
        let fake = FakeDatabase::new();
        fake.create(TableDefinition::new("t").with_column(ColumnDefinition::new("Email", "TEXT")));

        let outcome = reconciler(&fake)
            .sync(&TableDefinition::new("t").with_column(ColumnDefinition::new("email", "TEXT")))
            .await
            .unwrap();
        assert!(outcome.is_noop());
    }
}
