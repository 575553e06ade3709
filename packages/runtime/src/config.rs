// ABOUTME: Runtime configuration loaded from process environment variables
// ABOUTME: Covers the sandbox image, listen port, label scope and observation ingress host

use std::env;
use std::num::ParseIntError;
use thiserror::Error;

const DEFAULT_PORT: u16 = 5266;
const DEFAULT_IMAGE: &str = "sandboxd/agent-box:latest";
const DEFAULT_RUNTIME_HOST: &str = "host.docker.internal";
const DEFAULT_SCOPE: &str = "default";
const DEFAULT_AGENT_PORT: u16 = 8000;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid port number: {0}")]
    InvalidPort(#[from] ParseIntError),
    #[error("Port {0} is out of valid range (1-65535)")]
    PortOutOfRange(u16),
    #[error("Invalid scope {0:?}: must be non-empty and free of whitespace")]
    InvalidScope(String),
}

/// Environment-driven configuration for the sandbox runtime.
///
/// `runtime_host` is the address at which this process is reachable *from
/// inside a sandbox container*; it is baked into the observation ingress URL
/// handed to every agent.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub port: u16,
    pub image: String,
    pub runtime_host: String,
    pub scope: String,
    pub agent_port: u16,
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port_str = env::var("SANDBOXD_PORT").unwrap_or_else(|_| DEFAULT_PORT.to_string());
        let port = port_str.parse::<u16>()?;
        if port == 0 {
            return Err(ConfigError::PortOutOfRange(port));
        }

        let image = env::var("SANDBOXD_IMAGE").unwrap_or_else(|_| DEFAULT_IMAGE.to_string());

        let runtime_host =
            env::var("SANDBOXD_RUNTIME_HOST").unwrap_or_else(|_| DEFAULT_RUNTIME_HOST.to_string());

        let scope = env::var("SANDBOXD_SCOPE").unwrap_or_else(|_| DEFAULT_SCOPE.to_string());
        if scope.is_empty() || scope.contains(char::is_whitespace) {
            return Err(ConfigError::InvalidScope(scope));
        }

        let agent_port = env::var("SANDBOXD_AGENT_PORT")
            .unwrap_or_else(|_| DEFAULT_AGENT_PORT.to_string())
            .parse::<u16>()?;

        Ok(RuntimeConfig {
            port,
            image,
            runtime_host,
            scope,
            agent_port,
        })
    }

    /// The ingress URL an agent must POST its observation frames to, as
    /// reachable from inside the container.
    pub fn observation_url(&self, sandbox_id: &str) -> String {
        format!(
            "http://{}:{}/v1/internal/observations/{}",
            self.runtime_host, self.port, sandbox_id
        )
    }

    /// Container name for a sandbox, namespaced by the label scope.
    pub fn container_name(&self, sandbox_id: &str) -> String {
        format!("sandboxd-{}-{}", self.scope, sandbox_id)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            port: DEFAULT_PORT,
            image: DEFAULT_IMAGE.to_string(),
            runtime_host: DEFAULT_RUNTIME_HOST.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            agent_port: DEFAULT_AGENT_PORT,
        }
    }
}
