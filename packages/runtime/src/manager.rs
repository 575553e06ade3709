// ABOUTME: Sandbox lifecycle manager orchestrating the container driver and registry
// ABOUTME: All driver I/O happens outside registry locks; state commits or rolls back after

use crate::config::RuntimeConfig;
use crate::driver::{ContainerDriver, ContainerSpec, DriverError, LABEL_SANDBOX_ID, LABEL_SCOPE};
use crate::hub::ObservationHub;
use crate::registry::{RegistryError, Sandbox, SandboxRegistry, SandboxState};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Grace period handed to the backend when stopping a sandbox container.
const STOP_GRACE: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum ManagerError {
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Sandbox not found: {0}")]
    NotFound(String),

    #[error("No agent address found for container {0}")]
    NoAgentAddress(String),
}

type Result<T> = std::result::Result<T, ManagerError>;

/// Picks the agent's address out of a container's attached networks.
///
/// The default-bridge prefix is skipped on the first pass because an address
/// there usually means the container never attached to its intended network;
/// the first non-empty address is the fallback. The prefix is a policy value
/// so exotic topologies can swap it out.
#[derive(Debug, Clone)]
pub struct AddressPolicy {
    pub skip_prefix: String,
}

impl Default for AddressPolicy {
    fn default() -> Self {
        AddressPolicy {
            skip_prefix: "172.17.".to_string(),
        }
    }
}

impl AddressPolicy {
    pub fn select<'a>(&self, addresses: &'a [String]) -> Option<&'a str> {
        addresses
            .iter()
            .find(|a| !a.is_empty() && !a.starts_with(&self.skip_prefix))
            .or_else(|| addresses.iter().find(|a| !a.is_empty()))
            .map(String::as_str)
    }
}

/// Response of a successful sandbox creation.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedSandbox {
    pub sandbox_id: String,
    pub agent_url: String,
}

/// Orchestrates sandbox lifecycle against the container driver and commits
/// authoritative state to the registry.
pub struct SandboxManager {
    driver: Arc<dyn ContainerDriver>,
    registry: Arc<SandboxRegistry>,
    hub: Arc<ObservationHub>,
    config: RuntimeConfig,
    address_policy: AddressPolicy,
}

impl SandboxManager {
    pub fn new(
        driver: Arc<dyn ContainerDriver>,
        registry: Arc<SandboxRegistry>,
        hub: Arc<ObservationHub>,
        config: RuntimeConfig,
    ) -> Self {
        Self {
            driver,
            registry,
            hub,
            config,
            address_policy: AddressPolicy::default(),
        }
    }

    pub fn with_address_policy(mut self, policy: AddressPolicy) -> Self {
        self.address_policy = policy;
        self
    }

    /// Provision a new sandbox: ensure the image, create and start the
    /// container, resolve the agent endpoint, and register it as `Running`.
    ///
    /// Any failure after the container exists triggers a best-effort
    /// force-remove so no orphans accumulate; nothing is registered until the
    /// sandbox is fully usable.
    pub async fn create_sandbox(&self) -> Result<CreatedSandbox> {
        let sandbox_id = Uuid::new_v4().to_string();
        let image = self.config.image.clone();

        info!(%sandbox_id, %image, "creating sandbox");

        self.driver.ensure_image(&image).await?;

        let mut env = HashMap::new();
        env.insert("SANDBOX_ID".to_string(), sandbox_id.clone());
        env.insert(
            "RUNTIME_OBSERVATION_URL".to_string(),
            self.config.observation_url(&sandbox_id),
        );

        let mut labels = HashMap::new();
        labels.insert(LABEL_SCOPE.to_string(), self.config.scope.clone());
        labels.insert(LABEL_SANDBOX_ID.to_string(), sandbox_id.clone());

        let spec = ContainerSpec {
            image,
            name: self.config.container_name(&sandbox_id),
            env,
            labels,
            exposed_port: self.config.agent_port,
        };

        let container_id = self.driver.create(&spec).await?;

        if let Err(e) = self.driver.start(&container_id).await {
            error!(%sandbox_id, %container_id, error = %e, "container start failed, rolling back");
            self.rollback_container(&container_id).await;
            return Err(e.into());
        }

        let addresses = match self.driver.inspect_addresses(&container_id).await {
            Ok(addresses) => addresses,
            Err(e) => {
                error!(%sandbox_id, %container_id, error = %e, "container inspect failed, rolling back");
                self.rollback_container(&container_id).await;
                return Err(e.into());
            }
        };

        let Some(agent_ip) = self.address_policy.select(&addresses) else {
            error!(%sandbox_id, %container_id, "container has no usable network address, rolling back");
            self.rollback_container(&container_id).await;
            return Err(ManagerError::NoAgentAddress(container_id));
        };

        let agent_url = format!("http://{}:{}", agent_ip, self.config.agent_port);

        let sandbox = Sandbox {
            id: sandbox_id.clone(),
            container_id: container_id.clone(),
            agent_url: agent_url.clone(),
            state: SandboxState::Running,
            created_at: Utc::now(),
        };

        if let Err(e) = self.registry.insert(sandbox).await {
            self.rollback_container(&container_id).await;
            return Err(e.into());
        }

        info!(%sandbox_id, %container_id, %agent_url, "sandbox running");
        Ok(CreatedSandbox {
            sandbox_id,
            agent_url,
        })
    }

    /// Tear a sandbox down. Stop failures are logged and teardown proceeds;
    /// a container that is already gone counts as success. The registry entry
    /// is cleared even when backend cleanup is incomplete, and the hub closes
    /// this sandbox's subscriber sockets.
    pub async fn delete_sandbox(&self, sandbox_id: &str) -> Result<()> {
        let Some(sandbox) = self.registry.begin_termination(sandbox_id).await else {
            return Err(ManagerError::NotFound(sandbox_id.to_string()));
        };

        info!(%sandbox_id, container_id = %sandbox.container_id, "deleting sandbox");

        if let Err(e) = self.driver.stop(&sandbox.container_id, STOP_GRACE).await {
            warn!(%sandbox_id, error = %e, "container stop failed, proceeding with removal");
        }

        if let Err(e) = self.driver.remove(&sandbox.container_id).await {
            warn!(%sandbox_id, error = %e, "container remove failed, clearing registry entry anyway");
        }

        self.registry.remove(sandbox_id).await;
        self.hub.close_sandbox(sandbox_id).await;

        info!(%sandbox_id, "sandbox deleted");
        Ok(())
    }

    /// Thin existence passthrough over the registry.
    pub async fn sandbox_exists(&self, sandbox_id: &str) -> bool {
        self.registry.exists(sandbox_id).await
    }

    pub async fn get_sandbox(&self, sandbox_id: &str) -> Option<Sandbox> {
        self.registry.get(sandbox_id).await
    }

    pub async fn list_sandboxes(&self) -> Vec<Sandbox> {
        self.registry.list().await
    }

    async fn rollback_container(&self, container_id: &str) {
        if let Err(e) = self.driver.remove(container_id).await {
            error!(%container_id, error = %e, "rollback remove failed, container may be orphaned");
        }
    }
}
