// ABOUTME: Shared API error type and HTTP status mapping
// ABOUTME: Keeps handler bodies on the spec's exact response shapes

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use sandboxd_runtime::{DispatchError, ManagerError};
use serde_json::json;

/// Error half of every handler: a status code plus a short message rendered
/// as `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<ManagerError> for ApiError {
    fn from(err: ManagerError) -> Self {
        match &err {
            ManagerError::NotFound(_) => ApiError::not_found(err.to_string()),
            _ => ApiError::internal(err.to_string()),
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        match &err {
            DispatchError::SandboxNotFound(_) => ApiError::not_found(err.to_string()),
            DispatchError::MalformedObservation(_) => ApiError::bad_request(err.to_string()),
        }
    }
}
