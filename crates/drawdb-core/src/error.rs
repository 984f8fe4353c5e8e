//! Core error types.

use sqlx::mysql::MySqlDatabaseError;
use thiserror::Error;

/// MySQL error number for "Table 'x' doesn't exist".
pub const ER_NO_SUCH_TABLE: u16 = 1146;

/// MySQL error number for "Unknown database 'x'".
pub const ER_BAD_DB_ERROR: u16 = 1049;

/// Errors raised by the execution interface.
#[derive(Debug, Error)]
pub enum DbError {
    /// Driver or server error reported by sqlx.
    #[error(transparent)]
    Driver(#[from] sqlx::Error),

    /// A result cell could not be converted into a JSON value.
    #[error("cannot decode column `{column}`: {reason}")]
    Decode {
        /// Column name.
        column: String,
        /// Decoder message.
        reason: String,
    },

    /// Error reported by an engine that is not backed by sqlx.
    #[error("error {code}: {message}")]
    Engine {
        /// MySQL-compatible error number.
        code: u16,
        /// Server message.
        message: String,
    },
}

impl DbError {
    /// The MySQL error number, when the server reported one.
    pub fn code(&self) -> Option<u16> {
        match self {
            DbError::Driver(sqlx::Error::Database(err)) => err
                .try_downcast_ref::<MySqlDatabaseError>()
                .map(MySqlDatabaseError::number),
            DbError::Engine { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// True when the server reported a missing table or database.
    pub fn is_missing_object(&self) -> bool {
        matches!(self.code(), Some(ER_NO_SUCH_TABLE | ER_BAD_DB_ERROR))
    }
}

/// Core errors.
///
/// `Validation` is the caller's fault and is raised before any database
/// access. Everything else depends on the state of the live database.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input (missing name, no columns, duplicate column...).
    #[error("validation error: {0}")]
    Validation(String),

    /// A table or database that was assumed to exist is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation targets an object that must not be modified.
    #[error("refused: {0}")]
    Protected(String),

    /// A catalog or data read failed.
    #[error("query failed ({context}): {source}")]
    Query {
        /// What was being read.
        context: String,
        /// Underlying database error.
        source: DbError,
    },

    /// A DDL or DML statement was rejected by the engine.
    #[error("statement failed: {statement}: {source}")]
    Ddl {
        /// The rejected statement.
        statement: String,
        /// Underlying database error.
        source: DbError,
    },
}

impl Error {
    /// Build a `Query` error mapper for the given context.
    pub fn query(context: impl Into<String>) -> impl FnOnce(DbError) -> Error {
        let context = context.into();
        move |source| Error::Query { context, source }
    }

    /// Build a `Ddl` error mapper for the given statement.
    pub fn ddl(statement: impl Into<String>) -> impl FnOnce(DbError) -> Error {
        let statement = statement.into();
        move |source| Error::Ddl { statement, source }
    }

    /// True for errors the caller can fix by changing the request.
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    /// The underlying database error, if any.
    pub fn db_error(&self) -> Option<&DbError> {
        match self {
            Error::Query { source, .. } | Error::Ddl { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;
