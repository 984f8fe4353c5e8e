//! Row endpoints.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use drawdb_core::{TableData, Value};
use serde_json::Map;

use crate::error::AppError;
use crate::json::{AffectedResponse, TableQuery};
use crate::AppState;

/// Data routes.
pub fn routes() -> Router<AppState> {
    Router::new().route(
        "/data",
        get(handle_page).post(handle_insert).delete(handle_delete),
    )
}

async fn handle_page(
    State(state): State<AppState>,
    Query(query): Query<TableQuery>,
) -> Result<Json<TableData>, AppError> {
    let table = query.require_table()?;
    let data = state
        .data()
        .page(
            table,
            query.page.unwrap_or(1),
            query.limit.unwrap_or(state.config.default_page_size),
        )
        .await?;
    Ok(Json(data))
}

async fn handle_insert(
    State(state): State<AppState>,
    Query(query): Query<TableQuery>,
    Json(row): Json<Map<String, Value>>,
) -> Result<Json<AffectedResponse>, AppError> {
    let table = query.require_table()?;
    let rows_affected = state.data().insert(table, &row).await?;
    Ok(Json(AffectedResponse {
        message: "Data inserted".to_string(),
        rows_affected,
    }))
}

/// Body keys are ANDed equality conditions.
async fn handle_delete(
    State(state): State<AppState>,
    Query(query): Query<TableQuery>,
    Json(conditions): Json<Map<String, Value>>,
) -> Result<Json<AffectedResponse>, AppError> {
    let table = query.require_table()?;
    let rows_affected = state.data().delete(table, &conditions).await?;
    Ok(Json(AffectedResponse {
        message: "Data deleted".to_string(),
        rows_affected,
    }))
}
