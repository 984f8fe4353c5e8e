//! Schema endpoint.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use drawdb_core::{DatabaseSchema, SchemaBuilder};

use crate::error::AppError;
use crate::json::SchemaQuery;
use crate::AppState;

/// Schema routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/schema", get(handle_get_schema))
}

/// Snapshot of `?db=`, or of the connection's database when omitted.
async fn handle_get_schema(
    State(state): State<AppState>,
    Query(query): Query<SchemaQuery>,
) -> Result<Json<DatabaseSchema>, AppError> {
    let schema = SchemaBuilder::new(state.db.as_ref())
        .build(&query.db)
        .await?;
    Ok(Json(schema))
}
