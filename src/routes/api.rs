use axum::{Router, routing::post};
use tower_http::trace::TraceLayer;

use crate::handlers::ingest;
use crate::state::AppState;
use std::sync::Arc;

/// Create the HTTP API router
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ingest", post(ingest::ingest_handler))
        .layer(TraceLayer::new_for_http())
}
