// ABOUTME: HTTP request handlers for sandbox lifecycle operations
// ABOUTME: Thin translation between the REST surface and the sandbox manager

use crate::response::ApiError;
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use sandboxd_runtime::CreatedSandbox;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Create a new sandbox and return its id together with the agent endpoint.
pub async fn create_sandbox(
    State(state): State<AppState>,
) -> Result<Json<CreatedSandbox>, ApiError> {
    let created = state.manager.create_sandbox().await?;
    Ok(Json(created))
}

/// Tear a sandbox down. 404 for ids the runtime does not know, which also
/// makes repeated deletes of the same id fail the second time.
pub async fn delete_sandbox(
    State(state): State<AppState>,
    Path(sandbox_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    info!(%sandbox_id, "delete requested");
    state.manager.delete_sandbox(&sandbox_id).await?;
    Ok(StatusCode::OK)
}

#[derive(Serialize)]
pub struct SandboxSummary {
    pub sandbox_id: String,
    pub agent_url: String,
}

pub async fn list_sandboxes(State(state): State<AppState>) -> Json<Vec<SandboxSummary>> {
    let sandboxes = state
        .manager
        .list_sandboxes()
        .await
        .into_iter()
        .map(|s| SandboxSummary {
            sandbox_id: s.id,
            agent_url: s.agent_url,
        })
        .collect();
    Json(sandboxes)
}
