//! JSON request and response types for the HTTP gateway.

use drawdb_core::SyncOutcome;
use serde::{Deserialize, Serialize};

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `healthy` or `degraded`.
    pub status: String,
    /// Gateway version.
    pub version: String,
    /// Whether the database answered a ping.
    pub database_connected: bool,
}

/// Plain acknowledgement.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Acknowledgement of a row-changing request.
#[derive(Debug, Serialize)]
pub struct AffectedResponse {
    pub message: String,
    pub rows_affected: u64,
}

/// Result of a table sync.
#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub message: String,
    #[serde(flatten)]
    pub outcome: SyncOutcome,
}

/// `POST /api/databases` body.
#[derive(Debug, Deserialize)]
pub struct CreateDatabaseRequest {
    #[serde(default)]
    pub name: String,
}

/// `POST /api/databases/rename` body.
#[derive(Debug, Deserialize)]
pub struct RenameDatabaseRequest {
    #[serde(default)]
    pub old_name: String,
    #[serde(default)]
    pub new_name: String,
}

/// `POST /api/execute` body.
#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    #[serde(default)]
    pub query: String,
}

/// `?name=` query.
#[derive(Debug, Default, Deserialize)]
pub struct NameQuery {
    pub name: Option<String>,
}

impl NameQuery {
    /// The name, or a bad request naming `what` is missing.
    pub fn require(self, what: &str) -> Result<String, crate::AppError> {
        self.name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| crate::AppError::BadRequest(format!("{what} name is required")))
    }
}

/// `?table=&page=&limit=` query.
#[derive(Debug, Default, Deserialize)]
pub struct TableQuery {
    pub table: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl TableQuery {
    /// The table name, or a bad request.
    pub fn require_table(&self) -> Result<&str, crate::AppError> {
        self.table
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| crate::AppError::BadRequest("Table name is required".to_string()))
    }
}

/// `?db=` query.
#[derive(Debug, Default, Deserialize)]
pub struct SchemaQuery {
    #[serde(default)]
    pub db: String,
}
