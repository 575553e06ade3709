// ABOUTME: Server-level configuration wrapping the runtime config with HTTP concerns
// ABOUTME: Everything is environment-driven; see RuntimeConfig for the sandbox knobs

use sandboxd_runtime::{ConfigError, RuntimeConfig};
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub runtime: RuntimeConfig,
    pub cors_origin: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let runtime = RuntimeConfig::from_env()?;

        let cors_origin =
            env::var("CORS_ORIGIN").unwrap_or_else(|_| "http://localhost:5173".to_string());

        Ok(Config {
            runtime,
            cors_origin,
        })
    }
}
