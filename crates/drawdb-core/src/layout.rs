//! Diagram positions, stored in a side table of the current database.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::exec::{Executor, Row, Value};
use crate::metadata::MetadataReader;
use crate::sql;

/// Name of the side table. The leading underscore keeps it out of built schemas.
pub const LAYOUT_TABLE: &str = "_layout";

/// Position of one table on the canvas. Both axes fit the `INT` columns of
/// the side table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

/// Reads and writes table positions.
#[derive(Clone)]
pub struct LayoutStore {
    db: Arc<dyn Executor>,
}

impl LayoutStore {
    pub fn new(db: Arc<dyn Executor>) -> Self {
        Self { db }
    }

    /// Create the side table unless it exists.
    pub async fn ensure(&self) -> Result<()> {
        let statement = sql::create_layout_table(LAYOUT_TABLE);
        self.db
            .execute(&statement, &[])
            .await
            .map_err(Error::ddl(statement.as_str()))?;
        Ok(())
    }

    /// Upsert every position in `layout`. Tables not mentioned keep theirs.
    pub async fn save(&self, layout: &BTreeMap<String, Position>) -> Result<()> {
        self.ensure().await?;

        let statement = sql::replace_layout(LAYOUT_TABLE);
        for (table, pos) in layout {
            self.db
                .execute(
                    &statement,
                    &[Value::from(table.as_str()), Value::from(pos.x), Value::from(pos.y)],
                )
                .await
                .map_err(Error::ddl(statement.as_str()))?;
        }
        debug!(tables = layout.len(), "Layout saved");
        Ok(())
    }

    /// Every stored position, ordered by table name. Empty when nothing was saved yet.
    pub async fn load(&self) -> Result<BTreeMap<String, Position>> {
        if !MetadataReader::new(self.db.as_ref())
            .table_exists(LAYOUT_TABLE)
            .await?
        {
            return Ok(BTreeMap::new());
        }

        let rows = self
            .db
            .query(&sql::select_layout(LAYOUT_TABLE), &[])
            .await
            .map_err(Error::query("read layout"))?;

        Ok(rows
            .iter()
            .filter_map(|row| {
                let table = row.get_str("table_name")?;
                let pos = Position {
                    x: axis(row, "x"),
                    y: axis(row, "y"),
                };
                Some((table.to_string(), pos))
            })
            .collect())
    }
}

fn axis(row: &Row, column: &str) -> i32 {
    row.get_i64(column)
        .and_then(|v| i32::try_from(v).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDatabase;

    fn store(fake: &FakeDatabase) -> LayoutStore {
        LayoutStore::new(Arc::new(fake.clone()))
    }

    #[tokio::test]
    async fn test_load_without_table_is_empty() {
        let fake = FakeDatabase::new();
        assert!(store(&fake).load().await.unwrap().is_empty());
        assert!(fake.ddl_statements().is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let fake = FakeDatabase::new();
        let layouts = store(&fake);

        let mut first = BTreeMap::new();
        first.insert("users".to_string(), Position { x: 10, y: 20 });
        first.insert("orders".to_string(), Position { x: -5, y: 0 });
        layouts.save(&first).await.unwrap();

        let mut second = BTreeMap::new();
        second.insert("users".to_string(), Position { x: 300, y: 40 });
        layouts.save(&second).await.unwrap();

        let loaded = layouts.load().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded["users"], Position { x: 300, y: 40 });
        assert_eq!(loaded["orders"], Position { x: -5, y: 0 });
        assert_eq!(fake.row_count(LAYOUT_TABLE), 2);
    }

    #[tokio::test]
    async fn test_position_json() {
        let pos: Position = serde_json::from_str(r#"{"x": 1, "y": 2}"#).unwrap();
        assert_eq!(pos, Position { x: 1, y: 2 });

        assert!(serde_json::from_str::<Position>(r#"{"x": 3000000000, "y": 0}"#).is_err());
        assert!(serde_json::from_str::<Position>(r#"{"x": 0, "y": -2147483649}"#).is_err());
    }

    #[tokio::test]
    async fn test_save_axis_bounds() {
        let fake = FakeDatabase::new();
        let layouts = store(&fake);

        let mut layout = BTreeMap::new();
        layout.insert("users".to_string(), Position { x: i32::MAX, y: i32::MIN });
        layouts.save(&layout).await.unwrap();

        assert_eq!(layouts.load().await.unwrap()["users"], Position { x: i32::MAX, y: i32::MIN });
    }
}
