//! Raw SQL endpoint.

use axum::{extract::State, routing::post, Json, Router};
use drawdb_core::Value;
use serde_json::Map;

use crate::error::AppError;
use crate::json::ExecuteRequest;
use crate::AppState;

/// Execute routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/execute", post(handle_execute))
}

/// Run the statement verbatim. No restriction beyond the database's own
/// privileges applies.
async fn handle_execute(
    State(state): State<AppState>,
    Json(body): Json<ExecuteRequest>,
) -> Result<Json<Vec<Map<String, Value>>>, AppError> {
    tracing::info!(query = %body.query, "Executing raw SQL");
    let rows = state.data().execute_raw(&body.query).await?;
    Ok(Json(rows))
}
