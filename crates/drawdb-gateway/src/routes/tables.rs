//! Table synchronization endpoints.

use axum::{
    extract::{Query, State},
    routing::post,
    Json, Router,
};
use drawdb_core::TableDefinition;

use crate::error::AppError;
use crate::json::{MessageResponse, NameQuery, SyncResponse};
use crate::AppState;

/// Table routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/tables", post(handle_sync).delete(handle_drop))
}

/// Create the table or add what it is missing.
async fn handle_sync(
    State(state): State<AppState>,
    Json(def): Json<TableDefinition>,
) -> Result<Json<SyncResponse>, AppError> {
    let outcome = state.reconciler().sync(&def).await?;
    Ok(Json(SyncResponse {
        message: "Table synced successfully".to_string(),
        outcome,
    }))
}

async fn handle_drop(
    State(state): State<AppState>,
    Query(query): Query<NameQuery>,
) -> Result<Json<MessageResponse>, AppError> {
    let name = query.require("Table")?;
    state.databases().drop_table(&name).await?;
    Ok(Json(MessageResponse::new("Table deleted successfully")))
}
