//! WebSocket route configuration
//!
//! `GET /media-stream` accepts the telephony provider's bidirectional media
//! stream. `GET /observer?blueprintPIN=<key>` subscribes to the audit feed
//! of the call configured with that key.

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::{media_stream_handler, observer_handler};
use crate::state::AppState;
use std::sync::Arc;

/// Create the WebSocket router
pub fn create_media_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/media-stream", get(media_stream_handler))
        .route("/observer", get(observer_handler))
        .layer(TraceLayer::new_for_http())
}
