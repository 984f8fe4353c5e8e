//! Diagram layout endpoints.

use std::collections::BTreeMap;

use axum::{extract::State, routing::get, Json, Router};
use drawdb_core::Position;

use crate::error::AppError;
use crate::json::MessageResponse;
use crate::AppState;

/// Layout routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/layout", get(handle_get).post(handle_save))
}

async fn handle_get(
    State(state): State<AppState>,
) -> Result<Json<BTreeMap<String, Position>>, AppError> {
    Ok(Json(state.layout().load().await?))
}

async fn handle_save(
    State(state): State<AppState>,
    Json(layout): Json<BTreeMap<String, Position>>,
) -> Result<Json<MessageResponse>, AppError> {
    state.layout().save(&layout).await?;
    Ok(Json(MessageResponse::new("Layout saved")))
}
