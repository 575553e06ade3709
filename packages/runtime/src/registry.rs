// ABOUTME: Concurrency-safe in-memory registry mapping sandbox ids to their state
// ABOUTME: The single source of truth for sandbox existence; entries are snapshot-on-read

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Sandbox already registered: {0}")]
    AlreadyExists(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxState {
    Provisioning,
    Running,
    Terminating,
    Terminated,
}

/// Authoritative record for one sandbox. Values handed out by the registry
/// are snapshots; mutations go through registry methods.
#[derive(Debug, Clone)]
pub struct Sandbox {
    pub id: String,
    pub container_id: String,
    pub agent_url: String,
    pub state: SandboxState,
    pub created_at: DateTime<Utc>,
}

impl Sandbox {
    pub fn is_running(&self) -> bool {
        self.state == SandboxState::Running
    }
}

/// Readers-writer map of live sandboxes.
///
/// The exclusive lock is only ever held for map mutation; callers perform all
/// container-backend I/O outside of it and commit or roll back afterwards.
#[derive(Default)]
pub struct SandboxRegistry {
    sandboxes: RwLock<HashMap<String, Sandbox>>,
}

impl SandboxRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new sandbox. Fails if the id is already present.
    pub async fn insert(&self, sandbox: Sandbox) -> Result<(), RegistryError> {
        let mut sandboxes = self.sandboxes.write().await;
        if sandboxes.contains_key(&sandbox.id) {
            return Err(RegistryError::AlreadyExists(sandbox.id));
        }
        sandboxes.insert(sandbox.id.clone(), sandbox);
        Ok(())
    }

    pub async fn get(&self, sandbox_id: &str) -> Option<Sandbox> {
        self.sandboxes.read().await.get(sandbox_id).cloned()
    }

    pub async fn exists(&self, sandbox_id: &str) -> bool {
        self.sandboxes.read().await.contains_key(sandbox_id)
    }

    /// Atomically flip a sandbox to `Terminating` and return a snapshot for
    /// teardown. Returns `None` if the sandbox is unknown or another caller
    /// already claimed termination, so concurrent deletes cannot both drive
    /// the container backend.
    pub async fn begin_termination(&self, sandbox_id: &str) -> Option<Sandbox> {
        let mut sandboxes = self.sandboxes.write().await;
        let entry = sandboxes.get_mut(sandbox_id)?;
        if entry.state == SandboxState::Terminating {
            return None;
        }
        entry.state = SandboxState::Terminating;
        Some(entry.clone())
    }

    pub async fn remove(&self, sandbox_id: &str) -> Option<Sandbox> {
        self.sandboxes.write().await.remove(sandbox_id)
    }

    pub async fn list(&self) -> Vec<Sandbox> {
        self.sandboxes.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.sandboxes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sandboxes.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox(id: &str) -> Sandbox {
        Sandbox {
            id: id.to_string(),
            container_id: format!("container-{id}"),
            agent_url: "http://10.0.0.2:8000".to_string(),
            state: SandboxState::Running,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_ids() {
        let registry = SandboxRegistry::new();
        registry.insert(sandbox("s1")).await.unwrap();

        let err = registry.insert(sandbox("s1")).await.unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyExists(id) if id == "s1"));
    }

    #[tokio::test]
    async fn get_returns_a_snapshot() {
        let registry = SandboxRegistry::new();
        registry.insert(sandbox("s1")).await.unwrap();

        let mut snapshot = registry.get("s1").await.unwrap();
        snapshot.state = SandboxState::Terminated;

        // Mutating the snapshot must not leak back into the registry.
        assert_eq!(
            registry.get("s1").await.unwrap().state,
            SandboxState::Running
        );
    }

    #[tokio::test]
    async fn begin_termination_claims_the_entry_once() {
        let registry = SandboxRegistry::new();
        registry.insert(sandbox("s1")).await.unwrap();

        let claimed = registry.begin_termination("s1").await;
        assert!(claimed.is_some());
        assert_eq!(
            registry.get("s1").await.unwrap().state,
            SandboxState::Terminating
        );

        // A second claim while teardown is in flight loses.
        assert!(registry.begin_termination("s1").await.is_none());
        assert!(registry.begin_termination("unknown").await.is_none());
    }

    #[tokio::test]
    async fn remove_clears_the_entry() {
        let registry = SandboxRegistry::new();
        registry.insert(sandbox("s1")).await.unwrap();

        assert!(registry.remove("s1").await.is_some());
        assert!(!registry.exists("s1").await);
        assert!(registry.remove("s1").await.is_none());
        assert!(registry.is_empty().await);
    }
}
