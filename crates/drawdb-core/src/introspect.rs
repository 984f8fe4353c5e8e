//! Schema model assembly.

use std::collections::HashSet;

use tracing::debug;

use crate::error::Result;
use crate::exec::Executor;
use crate::metadata::{MetadataReader, SchemaScope};
use crate::model::{ColumnSchema, DatabaseSchema, KeyFlag, TableSchema};

/// Tables whose name starts with this prefix are internal (the layout side
/// table among them) and never appear in a built schema.
pub const RESERVED_PREFIX: &str = "_";

/// Whether `table` is an internal table.
pub fn is_reserved(table: &str) -> bool {
    table.starts_with(RESERVED_PREFIX)
}

/// Builds a [`DatabaseSchema`] snapshot from the live catalog.
pub struct SchemaBuilder<'a> {
    reader: MetadataReader<'a>,
}

impl<'a> SchemaBuilder<'a> {
    pub fn new(db: &'a dyn Executor) -> Self {
        Self {
            reader: MetadataReader::new(db),
        }
    }

    /// Snapshot `db_name`, or the current database when it is empty.
    ///
    /// Any failing catalog read aborts the whole build.
    pub async fn build(&self, db_name: &str) -> Result<DatabaseSchema> {
        let scope = SchemaScope::from_name(db_name);
        let mut schema = DatabaseSchema::default();

        for table in self.reader.list_tables(scope).await? {
            if is_reserved(&table) {
                continue;
            }

            let columns = self
                .reader
                .columns(scope, &table)
                .await?
                .into_iter()
                .map(|col| ColumnSchema {
                    is_pk: col.key == KeyFlag::Primary,
                    is_fk: col.key == KeyFlag::Multiple,
                    name: col.name,
                    column_type: col.column_type,
                })
                .collect();
            let mut table_schema = TableSchema {
                name: table,
                columns,
            };

            let edges = self.reader.foreign_keys(scope, &table_schema.name).await?;

            // `MUL` marks any indexed column; only real edges make a column a foreign key.
            let sources: HashSet<&str> = edges.iter().map(|e| e.source_column.as_str()).collect();
            for col in &mut table_schema.columns {
                col.is_fk = sources.contains(col.name.as_str());
            }

            debug!(
                table = %table_schema.name,
                columns = table_schema.columns.len(),
                foreign_keys = edges.len(),
                "Introspected table"
            );
            schema.relations.extend(edges);
            schema.tables.push(table_schema);
        }

        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::testing::FakeDatabase;
    use crate::{ColumnDefinition, ForeignKeyDefinition, RelationSchema, TableDefinition};

    #[tokio::test]
    async fn test_build_current_database() {
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

        let schema = SchemaBuilder::new(&fake).build("").await.unwrap();

        assert_eq!(schema.tables.len(), 2);
        let orders = schema.table("orders").unwrap();
        assert!(orders.column("id").unwrap().is_pk);
        assert!(!orders.column("id").unwrap().is_fk);
        assert!(orders.column("user_id").unwrap().is_fk);
        assert_eq!(
            schema.relations,
            vec![RelationSchema {
                source_table: "orders".into(),
                source_column: "user_id".into(),
                target_table: "users".into(),
                target_column: "id".into(),
            }]
        );
    }

    #[tokio::test]
    async fn test_indexed_column_without_edge_is_not_foreign_key() {
        let fake = FakeDatabase::new();
        fake.create(
            TableDefinition::new("events")
                .with_column(ColumnDefinition::new("id", "INT").primary_key())
                .with_column(ColumnDefinition::new("kind", "VARCHAR(20)")),
        );
        fake.set_key_flag("events", "kind", "MUL");

        let schema = SchemaBuilder::new(&fake).build("").await.unwrap();
        assert!(!schema.table("events").unwrap().column("kind").unwrap().is_fk);
        assert!(schema.relations.is_empty());
    }

    #[tokio::test]
    async fn test_reserved_tables_are_skipped() {
        let fake = FakeDatabase::new();
        fake.create(TableDefinition::new("_layout").with_column(ColumnDefinition::new("x", "INT")));
        fake.create(TableDefinition::new("notes").with_column(ColumnDefinition::new("id", "INT")));

        let schema = SchemaBuilder::new(&fake).build("").await.unwrap();
        let names: Vec<_> = schema.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["notes"]);
    }

    #[tokio::test]
    async fn test_build_named_database() {
        let fake = FakeDatabase::new();
        fake.add_database("blog");
        fake.create_in(
            "blog",
            TableDefinition::new("post").with_column(ColumnDefinition::new("id", "INT").primary_key()),
        );

        let schema = SchemaBuilder::new(&fake).build("blog").await.unwrap();
        assert_eq!(schema.tables.len(), 1);
        assert_eq!(schema.tables[0].name, "post");

        let current = SchemaBuilder::new(&fake).build("").await.unwrap();
        assert!(current.tables.is_empty());
    }

    #[tokio::test]
    async fn test_build_fails_fast() {
        let fake = FakeDatabase::new();
        fake.create(TableDefinition::new("a").with_column(ColumnDefinition::new("id", "INT")));
        fake.fail_when("SHOW COLUMNS", 2013, "Lost connection to MySQL server");

        let err = SchemaBuilder::new(&fake).build("").await.unwrap_err();
        assert!(matches!(err, Error::Query { .. }));
    }

    #[tokio::test]
    async fn test_unknown_database_is_not_found() {
        let fake = FakeDatabase::new();
        let err = SchemaBuilder::new(&fake).build("ghost").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
