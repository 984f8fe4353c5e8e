//! Foreign key constraint naming and existence checks.

use crate::error::{Error, Result};
use crate::exec::{query_count, Executor, Value};
use crate::sql;

/// Deterministic constraint name for a foreign key on `table.column`.
///
/// One name per (table, column) pair, so a column carries at most one
/// foreign key created through the reconciler.
pub fn foreign_key_name(table: &str, column: &str) -> String {
    format!("fk_{table}_{column}")
}

/// Looks up named constraints in the current database.
pub struct ConstraintChecker<'a> {
    db: &'a dyn Executor,
}

impl<'a> ConstraintChecker<'a> {
    pub fn new(db: &'a dyn Executor) -> Self {
        Self { db }
    }

    /// Whether `table` carries a constraint called `name`. Both must match exactly.
    pub async fn exists(&self, table: &str, name: &str) -> Result<bool> {
        let count = query_count(
            self.db,
            sql::CONSTRAINT_EXISTS,
            &[Value::from(name), Value::from(table)],
        )
        .await
        .map_err(Error::query(format!("constraint {name} on {table}")))?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDatabase;
    use crate::{ColumnDefinition, ForeignKeyDefinition, TableDefinition};

    #[test]
    fn test_foreign_key_name() {
        assert_eq!(foreign_key_name("orders", "user_id"), "fk_orders_user_id");
        assert_ne!(
            foreign_key_name("orders", "user_id"),
            foreign_key_name("orders", "shop_id")
        );
    }

    #[tokio::test]
    async fn test_exists_matches_table_and_name() {
        let fake = FakeDatabase::new();
        fake.create(
            TableDefinition::new("users").with_column(ColumnDefinition::new("id", "INT").primary_key()),
        );
        fake.create(
            TableDefinition::new("orders")
                .with_column(ColumnDefinition::new("id", "INT").primary_key())
                .with_column(ColumnDefinition::new("user_id", "INT"))
                .with_foreign_key(ForeignKeyDefinition::new("user_id", "users", "id")),
        );

        let checker = ConstraintChecker::new(&fake);
        assert!(checker.exists("orders", "fk_orders_user_id").await.unwrap());
        assert!(!checker.exists("users", "fk_orders_user_id").await.unwrap());
        assert!(!checker.exists("orders", "fk_orders_id").await.unwrap());
    }
}
