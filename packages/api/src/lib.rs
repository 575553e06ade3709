// ABOUTME: HTTP API layer for the sandbox runtime providing REST endpoints and routing
// ABOUTME: Integration layer that wires the manager, dispatcher and hub into axum

use axum::{
    routing::{delete, get, post},
    Router,
};
use sandboxd_runtime::{ActionDispatcher, ObservationHub, SandboxManager};
use std::sync::Arc;

pub mod action_handlers;
pub mod ingress_handlers;
pub mod response;
pub mod sandbox_handlers;
pub mod stream_handlers;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SandboxManager>,
    pub dispatcher: Arc<ActionDispatcher>,
    pub hub: Arc<ObservationHub>,
}

/// Creates the full service router.
///
/// The `/v1/internal` subtree is the agent ingress path; it is expected to be
/// reachable only from managed containers via network policy.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/health", get(sandbox_handlers::health))
        .route(
            "/v1/sandboxes",
            post(sandbox_handlers::create_sandbox).get(sandbox_handlers::list_sandboxes),
        )
        .route("/v1/sandboxes/{id}", delete(sandbox_handlers::delete_sandbox))
        .route("/v1/sandboxes/{id}/shell", post(action_handlers::run_shell))
        .route(
            "/v1/sandboxes/{id}/ipython",
            post(action_handlers::run_ipython),
        )
        .route(
            "/v1/sandboxes/{id}/stream",
            get(stream_handlers::stream_observations),
        )
        .route(
            "/v1/internal/observations/{id}",
            post(ingress_handlers::ingest_observation),
        )
        .with_state(state)
}
