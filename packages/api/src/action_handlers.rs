// ABOUTME: HTTP request handlers for dispatching shell and ipython actions
// ABOUTME: Validates request bodies and forwards payload fields unchanged

use crate::response::ApiError;
use crate::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use sandboxd_runtime::ActionKind;
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Serialize)]
pub struct ActionResponse {
    pub action_id: String,
}

/// POST /v1/sandboxes/{id}/shell with `{ command, split_output? }`.
pub async fn run_shell(
    State(state): State<AppState>,
    Path(sandbox_id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<ActionResponse>, ApiError> {
    let payload = action_payload(&body, "command")?;
    let action_id = state
        .dispatcher
        .initiate(&sandbox_id, ActionKind::Shell, payload)
        .await?;
    Ok(Json(ActionResponse { action_id }))
}

/// POST /v1/sandboxes/{id}/ipython with `{ code, split_output? }`.
pub async fn run_ipython(
    State(state): State<AppState>,
    Path(sandbox_id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<ActionResponse>, ApiError> {
    let payload = action_payload(&body, "code")?;
    let action_id = state
        .dispatcher
        .initiate(&sandbox_id, ActionKind::Ipython, payload)
        .await?;
    Ok(Json(ActionResponse { action_id }))
}

/// Build the agent payload: the required string field plus the optional
/// passthrough fields, everything else rejected with 400.
fn action_payload(body: &Value, required: &'static str) -> Result<Map<String, Value>, ApiError> {
    let object = body
        .as_object()
        .ok_or_else(|| ApiError::bad_request("request body must be a JSON object"))?;

    let value = object
        .get(required)
        .and_then(Value::as_str)
        .ok_or_else(|| {
            ApiError::bad_request(format!("missing required string field: {required}"))
        })?;

    let mut payload = Map::new();
    payload.insert(required.to_string(), Value::String(value.to_string()));
    if let Some(split_output) = object.get("split_output") {
        if !split_output.is_boolean() {
            return Err(ApiError::bad_request("split_output must be a boolean"));
        }
        payload.insert("split_output".to_string(), split_output.clone());
    }

    Ok(payload)
}
