// ABOUTME: Action dispatcher turning client requests into tracked action ids plus observations
// ABOUTME: Owns start/end synthesis and the ingress path for agent-pushed frames

use crate::hub::ObservationHub;
use crate::observation::{self, ObservationEnvelope, EXIT_CODE_UNKNOWN};
use crate::registry::SandboxRegistry;
use bytes::Bytes;
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Sandbox not found or not running: {0}")]
    SandboxNotFound(String),

    #[error("Malformed observation: {0}")]
    MalformedObservation(#[from] serde_json::Error),
}

type Result<T> = std::result::Result<T, DispatchError>;

/// The two action kinds the in-container agent understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Shell,
    Ipython,
}

impl ActionKind {
    /// Tool path on the agent's HTTP API.
    pub fn agent_path(&self) -> &'static str {
        match self {
            ActionKind::Shell => "/tools:run_shell_command",
            ActionKind::Ipython => "/tools:run_ipython_cell",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Shell => "shell",
            ActionKind::Ipython => "ipython",
        }
    }
}

/// Dispatches actions to in-sandbox agents and ingests the observations they
/// push back. The only component that synthesizes `start` and `end` frames.
pub struct ActionDispatcher {
    registry: Arc<SandboxRegistry>,
    hub: Arc<ObservationHub>,
    http: reqwest::Client,
}

impl ActionDispatcher {
    pub fn new(
        registry: Arc<SandboxRegistry>,
        hub: Arc<ObservationHub>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            registry,
            hub,
            http,
        }
    }

    /// Accept an action, publish its `start` frame, and hand the agent call
    /// to a background task. Returns the minted action id immediately; all
    /// further progress arrives on the observation stream.
    pub async fn initiate(
        &self,
        sandbox_id: &str,
        kind: ActionKind,
        payload: Map<String, Value>,
    ) -> Result<String> {
        let sandbox = self
            .registry
            .get(sandbox_id)
            .await
            .filter(|s| s.is_running())
            .ok_or_else(|| DispatchError::SandboxNotFound(sandbox_id.to_string()))?;

        let action_id = Uuid::new_v4().to_string();
        let url = format!("{}{}", sandbox.agent_url, kind.agent_path());

        // Client payload fields pass through unchanged; the runtime only adds
        // the correlation id.
        let mut body = payload;
        body.insert("action_id".to_string(), Value::String(action_id.clone()));

        // `start` goes out before the agent request so subscribers always see
        // it ahead of any agent-emitted frame.
        self.hub
            .publish(sandbox_id, observation::start_frame(&action_id))
            .await;

        let hub = self.hub.clone();
        let http = self.http.clone();
        let sandbox_id = sandbox_id.to_string();
        let task_action_id = action_id.clone();
        tokio::spawn(async move {
            forward_to_agent(hub, http, sandbox_id, task_action_id, url, Value::Object(body)).await;
        });

        info!(sandbox_id = %sandbox.id, %action_id, kind = kind.as_str(), "action initiated");
        Ok(action_id)
    }

    /// Ingest a frame the agent pushed for `sandbox_id`.
    ///
    /// Unknown sandboxes are a silent discard: the agent may legitimately be
    /// racing with deletion and must not retry. The original bytes are what
    /// subscribers receive; a `result` frame additionally produces the
    /// synthesized `end`.
    pub async fn ingest_observation(&self, sandbox_id: &str, raw: Bytes) -> Result<()> {
        if !self.registry.exists(sandbox_id).await {
            debug!(%sandbox_id, "discarding observation for unknown sandbox");
            return Ok(());
        }

        let envelope = ObservationEnvelope::parse(&raw)?;

        let Some(action_id) = envelope.action_id.as_deref().filter(|id| !id.is_empty()) else {
            warn!(%sandbox_id, kind = %envelope.kind, "discarding observation without action_id");
            return Ok(());
        };

        self.hub.publish(sandbox_id, raw.clone()).await;

        if envelope.is_result() {
            let exit_code = envelope.exit_code_or_unknown();
            let end = observation::end_frame(action_id, exit_code, envelope.error_message());
            debug!(%sandbox_id, %action_id, exit_code, "result received, synthesizing end");
            self.hub.publish(sandbox_id, end).await;
        }

        Ok(())
    }
}

/// Background half of `initiate`: POST the request to the agent and report
/// only immediate failures. On a 2xx the agent owns all further observations.
async fn forward_to_agent(
    hub: Arc<ObservationHub>,
    http: reqwest::Client,
    sandbox_id: String,
    action_id: String,
    url: String,
    body: Value,
) {
    let response = http.post(&url).json(&body).send().await;

    let failure = match response {
        Err(e) => Some(format!("failed to reach agent at {url}: {e}")),
        Ok(resp) if resp.status().as_u16() >= 400 => {
            let status = resp.status();
            let detail = resp.text().await.unwrap_or_default();
            if detail.is_empty() {
                Some(format!("agent returned status {status}"))
            } else {
                Some(format!("agent returned status {status}: {detail}"))
            }
        }
        Ok(resp) => {
            debug!(%sandbox_id, %action_id, status = %resp.status(), "action accepted by agent");
            None
        }
    };

    if let Some(message) = failure {
        warn!(%sandbox_id, %action_id, error = %message, "action dispatch failed");
        hub.publish(&sandbox_id, observation::error_frame(&action_id, &message))
            .await;
        hub.publish(
            &sandbox_id,
            observation::end_frame(&action_id, EXIT_CODE_UNKNOWN, Some(&message)),
        )
        .await;
    }
}
