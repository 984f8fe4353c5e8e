//! Desired-state definitions and observed schema snapshots.
//!
//! Definitions (`*Definition`) are the input of a sync call and are never
//! mutated by it. Schemas (`*Schema`) are rebuilt from the live catalog on
//! every read.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Desired column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    /// Column name.
    pub name: String,
    /// Declared type, e.g. `INT` or `VARCHAR(20)`.
    #[serde(rename = "type")]
    pub column_type: String,
    /// Optional length, appended as `TYPE(length)` when the type has none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    /// Part of the primary key.
    #[serde(default, rename = "is_pk")]
    pub primary_key: bool,
    /// `NOT NULL`.
    #[serde(default, rename = "is_nn")]
    pub not_null: bool,
    /// `AUTO_INCREMENT`. Only honoured when the table is created.
    #[serde(default, rename = "is_ai")]
    pub auto_increment: bool,
    /// Default value literal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

impl ColumnDefinition {
    /// Create a nullable column without flags.
    pub fn new(name: impl Into<String>, column_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: column_type.into(),
            length: None,
            primary_key: false,
            not_null: false,
            auto_increment: false,
            default_value: None,
        }
    }

    /// Mark as primary key.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Mark as `NOT NULL`.
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Mark as `AUTO_INCREMENT`.
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Set the length.
    pub fn with_length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    /// Set the default value.
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default_value = Some(default.into());
        self
    }

    /// Declared type with the length applied.
    ///
    /// A zero length or a type that already carries a parenthesized length
    /// is left untouched.
    pub fn sql_type(&self) -> String {
        let ty = self.column_type.trim();
        match self.length {
            Some(length) if length > 0 && !ty.contains('(') => format!("{}({})", ty, length),
            _ => ty.to_string(),
        }
    }

    /// Default value, treating an empty string as absent.
    pub fn default_literal(&self) -> Option<&str> {
        self.default_value.as_deref().filter(|d| !d.is_empty())
    }
}

/// Referential action for `ON DELETE` / `ON UPDATE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferentialAction {
    Cascade,
    SetNull,
    Restrict,
    NoAction,
    SetDefault,
}

impl ReferentialAction {
    /// SQL keyword form.
    pub fn as_sql(&self) -> &'static str {
        match self {
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::SetDefault => "SET DEFAULT",
        }
    }
}

impl fmt::Display for ReferentialAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for ReferentialAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s
            .trim()
            .split(|c: char| c == '_' || c.is_whitespace())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_uppercase();

        match normalized.as_str() {
            "CASCADE" => Ok(ReferentialAction::Cascade),
            "SET NULL" => Ok(ReferentialAction::SetNull),
            "RESTRICT" => Ok(ReferentialAction::Restrict),
            "NO ACTION" => Ok(ReferentialAction::NoAction),
            "SET DEFAULT" => Ok(ReferentialAction::SetDefault),
            _ => Err(format!("unknown referential action: {:?}", s)),
        }
    }
}

impl Serialize for ReferentialAction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_sql())
    }
}

impl<'de> Deserialize<'de> for ReferentialAction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Empty strings and `null` both mean "no action clause".
fn optional_action<'de, D>(deserializer: D) -> Result<Option<ReferentialAction>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) if !raw.trim().is_empty() => {
            raw.parse().map(Some).map_err(serde::de::Error::custom)
        }
        _ => Ok(None),
    }
}

/// Desired foreign key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyDefinition {
    /// Source column on the table being synced.
    pub column_name: String,
    /// Referenced table.
    pub ref_table_name: String,
    /// Referenced column.
    pub ref_column_name: String,
    /// `ON DELETE` action.
    #[serde(
        default,
        deserialize_with = "optional_action",
        skip_serializing_if = "Option::is_none"
    )]
    pub on_delete: Option<ReferentialAction>,
    /// `ON UPDATE` action.
    #[serde(
        default,
        deserialize_with = "optional_action",
        skip_serializing_if = "Option::is_none"
    )]
    pub on_update: Option<ReferentialAction>,
}

impl ForeignKeyDefinition {
    /// Create a foreign key without actions.
    pub fn new(
        column_name: impl Into<String>,
        ref_table_name: impl Into<String>,
        ref_column_name: impl Into<String>,
    ) -> Self {
        Self {
            column_name: column_name.into(),
            ref_table_name: ref_table_name.into(),
            ref_column_name: ref_column_name.into(),
            on_delete: None,
            on_update: None,
        }
    }

    /// Set the `ON DELETE` action.
    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = Some(action);
        self
    }

    /// Set the `ON UPDATE` action.
    pub fn on_update(mut self, action: ReferentialAction) -> Self {
        self.on_update = Some(action);
        self
    }
}

/// Desired table: the unit of reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDefinition {
    /// Table name.
    #[serde(default)]
    pub name: String,
    /// Columns in declaration order.
    #[serde(default)]
    pub columns: Vec<ColumnDefinition>,
    /// Foreign keys in declaration order.
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyDefinition>,
}

impl TableDefinition {
    /// Create an empty definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    /// Add a column.
    pub fn with_column(mut self, column: ColumnDefinition) -> Self {
        self.columns.push(column);
        self
    }

    /// Add a foreign key.
    pub fn with_foreign_key(mut self, fk: ForeignKeyDefinition) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    /// Names of the primary key columns, in declaration order.
    pub fn primary_key_columns(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
    }
}

/// Classification of the `Key` column reported by `SHOW COLUMNS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyFlag {
    /// `PRI`: part of the primary key.
    Primary,
    /// `UNI`: first column of a unique index.
    Unique,
    /// `MUL`: first column of a non-unique index. Foreign key columns show up
    /// here, but so does any other indexed column.
    Multiple,
    /// Not indexed.
    #[default]
    None,
}

impl KeyFlag {
    /// Parse the raw `Key` value.
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "PRI" => KeyFlag::Primary,
            "UNI" => KeyFlag::Unique,
            "MUL" => KeyFlag::Multiple,
            _ => KeyFlag::None,
        }
    }

    /// The raw `Key` value.
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyFlag::Primary => "PRI",
            KeyFlag::Unique => "UNI",
            KeyFlag::Multiple => "MUL",
            KeyFlag::None => "",
        }
    }
}

/// Observed column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
    pub is_pk: bool,
    pub is_fk: bool,
}

/// One live foreign-key edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationSchema {
    pub source_table: String,
    pub source_column: String,
    pub target_table: String,
    pub target_column: String,
}

/// Observed table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    /// Find a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Observed snapshot of one database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSchema {
    pub tables: Vec<TableSchema>,
    pub relations: Vec<RelationSchema>,
}

impl DatabaseSchema {
    /// Find a table by name.
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_table_definition_payload() {
        let payload = json!({
            "name": "orders",
            "columns": [
                {"name": "id", "type": "INT", "is_pk": true, "is_ai": true},
                {"name": "user_id", "type": "INT", "is_nn": true},
                {"name": "note", "type": "VARCHAR", "length": 120, "default_value": "n/a"}
            ],
            "foreign_keys": [
                {"column_name": "user_id", "ref_table_name": "users", "ref_column_name": "id",
                 "on_delete": "cascade", "on_update": ""}
            ]
        });

        let def: TableDefinition = serde_json::from_value(payload).unwrap();
        assert_eq!(def.name, "orders");
        assert!(def.columns[0].primary_key && def.columns[0].auto_increment);
        assert!(!def.columns[0].not_null);
        assert!(def.columns[1].not_null);
        assert_eq!(def.columns[2].sql_type(), "VARCHAR(120)");
        assert_eq!(def.columns[2].default_literal(), Some("n/a"));
        assert_eq!(def.foreign_keys[0].on_delete, Some(ReferentialAction::Cascade));
        assert_eq!(def.foreign_keys[0].on_update, None);
    }

    #[test]
    fn test_foreign_keys_are_optional() {
        let def: TableDefinition =
            serde_json::from_value(json!({"name": "t", "columns": [{"name": "a", "type": "INT"}]}))
                .unwrap();
        assert!(def.foreign_keys.is_empty());
    }

    #[test]
    fn test_unknown_action_is_rejected() {
        let result: Result<ForeignKeyDefinition, _> = serde_json::from_value(json!({
            "column_name": "a", "ref_table_name": "b", "ref_column_name": "c",
            "on_delete": "EXPLODE"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_referential_action_spellings() {
        assert_eq!("set_null".parse::<ReferentialAction>(), Ok(ReferentialAction::SetNull));
        assert_eq!("No  Action".parse::<ReferentialAction>(), Ok(ReferentialAction::NoAction));
        assert_eq!(ReferentialAction::SetDefault.to_string(), "SET DEFAULT");
    }

    #[test]
    fn test_sql_type_keeps_explicit_length() {
        let col = ColumnDefinition::new("status", "VARCHAR(20)").with_length(40);
        assert_eq!(col.sql_type(), "VARCHAR(20)");

        let col = ColumnDefinition::new("n", "INT").with_length(0);
        assert_eq!(col.sql_type(), "INT");
    }

    #[test]
    fn test_key_flag_parse() {
        assert_eq!(KeyFlag::parse("PRI"), KeyFlag::Primary);
        assert_eq!(KeyFlag::parse("MUL"), KeyFlag::Multiple);
        assert_eq!(KeyFlag::parse(""), KeyFlag::None);
        assert_eq!(KeyFlag::Unique.as_str(), "UNI");
    }

    #[test]
    fn test_schema_serialization_shape() {
        let schema = DatabaseSchema {
            tables: vec![TableSchema {
                name: "orders".into(),
                columns: vec![ColumnSchema {
                    name: "id".into(),
                    column_type: "int".into(),
                    is_pk: true,
                    is_fk: false,
                }],
            }],
            relations: vec![],
        };

        assert_eq!(
            serde_json::to_value(&schema).unwrap(),
            json!({
                "tables": [{"name": "orders", "columns": [
                    {"name": "id", "type": "int", "is_pk": true, "is_fk": false}
                ]}],
                "relations": []
            })
        );
    }
}
