//! drawdb HTTP/JSON gateway.
//!
//! Exposes schema introspection, table synchronization, row access, raw SQL
//! and the diagram layout of a MySQL database as a REST API under `/api`.

pub mod config;
pub mod error;
pub mod json;
pub mod routes;

pub use config::{Args, GatewayConfig};
pub use error::AppError;

use std::sync::Arc;

use axum::Router;
use drawdb_core::{DataService, DatabaseService, Executor, LayoutStore, Reconciler};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    /// Database access. Pooled in production.
    pub db: Arc<dyn Executor>,
    /// Gateway configuration.
    pub config: GatewayConfig,
}

impl AppState {
    /// Create new application state.
    pub fn new(db: Arc<dyn Executor>, config: GatewayConfig) -> Self {
        Self { db, config }
    }

    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(Arc::clone(&self.db))
    }

    pub fn data(&self) -> DataService {
        DataService::new(Arc::clone(&self.db))
    }

    pub fn databases(&self) -> DatabaseService {
        DatabaseService::new(Arc::clone(&self.db))
    }

    pub fn layout(&self) -> LayoutStore {
        LayoutStore::new(Arc::clone(&self.db))
    }
}

/// Create the router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .merge(routes::health::routes())
        .merge(routes::schema::routes())
        .merge(routes::databases::routes())
        .merge(routes::tables::routes())
        .merge(routes::data::routes())
        .merge(routes::execute::routes())
        .merge(routes::layout::routes());

    Router::new()
        .nest("/api", api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
