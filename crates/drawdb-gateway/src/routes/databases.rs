//! Database administration endpoints.

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};

use crate::error::AppError;
use crate::json::{CreateDatabaseRequest, MessageResponse, NameQuery, RenameDatabaseRequest};
use crate::AppState;

/// Database routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/databases",
            get(handle_list)
                .post(handle_create)
                .delete(handle_drop),
        )
        .route("/databases/rename", post(handle_rename))
}

async fn handle_list(State(state): State<AppState>) -> Result<Json<Vec<String>>, AppError> {
    Ok(Json(state.databases().list().await?))
}

async fn handle_create(
    State(state): State<AppState>,
    Json(body): Json<CreateDatabaseRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    state.databases().create(&body.name).await?;
    Ok(Json(MessageResponse::new("Database created")))
}

async fn handle_drop(
    State(state): State<AppState>,
    Query(query): Query<NameQuery>,
) -> Result<Json<MessageResponse>, AppError> {
    let name = query.require("Database")?;
    state.databases().drop(&name).await?;
    Ok(Json(MessageResponse::new("Database dropped")))
}

async fn handle_rename(
    State(state): State<AppState>,
    Json(body): Json<RenameDatabaseRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    state
        .databases()
        .rename(&body.old_name, &body.new_name)
        .await?;
    Ok(Json(MessageResponse::new("Database renamed")))
}
