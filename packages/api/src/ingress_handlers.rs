// ABOUTME: Internal ingress endpoint accepting observation frames pushed by agents
// ABOUTME: Unknown sandboxes get 200 so agents never retry against a dead sandbox

use crate::response::ApiError;
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
};
use bytes::Bytes;

/// POST /v1/internal/observations/{id} with an observation frame as the body.
pub async fn ingest_observation(
    State(state): State<AppState>,
    Path(sandbox_id): Path<String>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    state.dispatcher.ingest_observation(&sandbox_id, body).await?;
    Ok(StatusCode::OK)
}
