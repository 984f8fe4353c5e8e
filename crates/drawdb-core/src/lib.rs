//! drawdb core - schema introspection and table synchronization.
//!
//! This crate reads live MySQL catalog metadata into a normalized schema model
//! and converges tables towards a declarative definition using additive-only
//! DDL (create table, add column, add foreign key).
//!
//! Every component talks to the database through the [`Executor`] trait, so the
//! same code runs against a pooled [`MySqlExecutor`] in production and an
//! in-memory fake in tests.

pub mod admin;
pub mod data;
pub mod error;
pub mod exec;
pub mod introspect;
pub mod layout;
pub mod metadata;
pub mod model;
pub mod mysql;
pub mod naming;
pub mod sql;
pub mod sync;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use admin::DatabaseService;
pub use data::{DataService, TableData};
pub use error::{DbError, Error, Result};
pub use exec::{Executor, Row, Value};
pub use introspect::SchemaBuilder;
pub use layout::{LayoutStore, Position};
pub use metadata::{LiveColumn, MetadataReader, SchemaScope};
pub use model::{
    ColumnDefinition, ColumnSchema, DatabaseSchema, ForeignKeyDefinition, KeyFlag,
    ReferentialAction, RelationSchema, TableDefinition, TableSchema,
};
pub use mysql::{MySqlExecutor, PoolSettings};
pub use naming::{foreign_key_name, ConstraintChecker};
pub use sync::{Reconciler, SyncOutcome};
