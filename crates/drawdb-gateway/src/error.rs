//! Error handling for the gateway.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed or incomplete request.
    #[error("{0}")]
    BadRequest(String),
    /// Table or database not found.
    #[error("{0}")]
    NotFound(String),
    /// Operation refused on a protected object.
    #[error("{0}")]
    Forbidden(String),
    /// The database rejected a statement or could not be reached.
    #[error("{0}")]
    Database(String),
}

/// Error response body.
#[derive(Serialize)]
pub struct ErrorResponse {
    /// Error flag.
    pub error: bool,
    /// Error code.
    pub code: String,
    /// Error message.
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg),
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR", msg)
            }
        };

        let body = ErrorResponse {
            error: true,
            code: code.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<drawdb_core::Error> for AppError {
    fn from(err: drawdb_core::Error) -> Self {
        use drawdb_core::Error;

        match err {
            Error::Validation(msg) => AppError::BadRequest(msg),
            Error::NotFound(what) => AppError::NotFound(format!("not found: {what}")),
            Error::Protected(msg) => AppError::Forbidden(msg),
            other @ (Error::Query { .. } | Error::Ddl { .. }) => {
                AppError::Database(other.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_error_mapping() {
        let err: AppError = drawdb_core::Error::Validation("no columns".into()).into();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);

        let err: AppError = drawdb_core::Error::NotFound("orders".into()).into();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);

        let err: AppError = drawdb_core::Error::Protected("mysql".into()).into();
        assert_eq!(err.into_response().status(), StatusCode::FORBIDDEN);

        let err: AppError = drawdb_core::Error::Ddl {
            statement: "DROP TABLE `t`".into(),
            source: drawdb_core::DbError::Engine {
                code: 1051,
                message: "Unknown table".into(),
            },
        }
        .into();
        assert!(err.to_string().contains("DROP TABLE"));
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
