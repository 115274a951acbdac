//! JSON ingest forwarding
//!
//! `POST /ingest` relays a JSON document to the configured processing
//! service and returns that service's status and JSON body unchanged.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use crate::errors::{AppError, AppResult};
use crate::state::AppState;

pub async fn ingest_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Value>,
) -> AppResult<Response> {
    let url = state
        .config
        .ingest_forward_url
        .as_deref()
        .ok_or(AppError::NotConfigured("Ingest forwarding"))?;

    info!(%url, "Forwarding ingest payload");

    let upstream = state.http_client.post(url).json(&payload).send().await?;
    let status = StatusCode::from_u16(upstream.status().as_u16())
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let bytes = upstream.bytes().await?;
    debug!(status = %status, bytes = bytes.len(), "Ingest service responded");

    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice::<Value>(&bytes)
            .map_err(|e| AppError::Upstream(format!("ingest service returned invalid JSON: {e}")))?
    };

    Ok((status, Json(body)).into_response())
}
