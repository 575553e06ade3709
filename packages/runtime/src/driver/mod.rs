// ABOUTME: Abstract container driver capability used by the sandbox manager
// ABOUTME: Defines the narrow lifecycle surface plus per-operation timeout budgets

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

pub mod docker;

pub use docker::DockerDriver;

/// Per-operation timeout budgets. The driver is the only component allowed to
/// block on the container backend, and every call is bounded.
pub const PULL_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const INSPECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const CREATE_TIMEOUT: Duration = Duration::from_secs(30);
pub const START_TIMEOUT: Duration = Duration::from_secs(15);
pub const STOP_TIMEOUT: Duration = Duration::from_secs(10);
pub const REMOVE_TIMEOUT: Duration = Duration::from_secs(15);

/// Labels stamped onto every managed container so scoped discovery and
/// cleanup can find them later.
pub const LABEL_SCOPE: &str = "sandboxd.scope";
pub const LABEL_SANDBOX_ID: &str = "sandboxd.id";

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("Container error: {0}")]
    Container(String),

    #[error("{op} timed out after {budget:?}")]
    Timeout { op: &'static str, budget: Duration },
}

type Result<T> = std::result::Result<T, DriverError>;

/// Creation-time container configuration.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub image: String,
    pub name: String,
    pub env: HashMap<String, String>,
    pub labels: HashMap<String, String>,
    /// TCP port the in-container agent listens on; exposed but not host-bound.
    pub exposed_port: u16,
}

/// One entry from a scoped container listing.
#[derive(Debug, Clone)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub labels: HashMap<String, String>,
    pub running: bool,
}

/// Outcome of a stop or remove against a container that may have disappeared
/// underneath us. `AlreadyGone` is success from the runtime's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposal {
    Done,
    AlreadyGone,
}

/// The capability set the manager needs from a container backend.
///
/// Implementations must keep each call within its timeout budget and must be
/// safe for concurrent use.
#[async_trait]
pub trait ContainerDriver: Send + Sync {
    /// Probe backend reachability. Used at startup so a dead backend is
    /// reported before the service starts accepting requests.
    async fn is_available(&self) -> bool;

    /// Idempotently make `image` present locally. Checks local presence
    /// first, fully drains any fetch, and re-verifies presence afterwards.
    async fn ensure_image(&self, image: &str) -> Result<()>;

    /// Create a container; returns the backend handle. Does not start it.
    async fn create(&self, spec: &ContainerSpec) -> Result<String>;

    async fn start(&self, handle: &str) -> Result<()>;

    /// Network addresses attached to the container, in backend order.
    async fn inspect_addresses(&self, handle: &str) -> Result<Vec<String>>;

    async fn stop(&self, handle: &str, grace: Duration) -> Result<Disposal>;

    /// Force-remove the container together with its anonymous volumes.
    async fn remove(&self, handle: &str) -> Result<Disposal>;

    /// List containers carrying this runtime's label scope.
    async fn list(&self, scope: &str) -> Result<Vec<ContainerSummary>>;
}
