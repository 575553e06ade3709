// ABOUTME: Shared test state builder for API route tests
// ABOUTME: Provides an in-memory container driver and fully wired AppState

use async_trait::async_trait;
use sandboxd_runtime::driver::{
    ContainerDriver, ContainerSpec, ContainerSummary, Disposal, DriverError, LABEL_SCOPE,
};
use sandboxd_runtime::{
    ActionDispatcher, HubConfig, ObservationHub, RuntimeConfig, SandboxManager, SandboxRegistry,
};
use sandboxd_api::AppState;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct FakeState {
    containers: HashMap<String, ContainerSpec>,
    next_id: u64,
}

/// Minimal in-memory container backend for route tests.
pub struct FakeDriver {
    state: Mutex<FakeState>,
    fail_pull: bool,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            fail_pull: false,
        }
    }

    pub fn failing_pull() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            fail_pull: true,
        }
    }
}

#[async_trait]
impl ContainerDriver for FakeDriver {
    async fn is_available(&self) -> bool {
        true
    }

    async fn ensure_image(&self, image: &str) -> Result<(), DriverError> {
        if self.fail_pull {
            return Err(DriverError::Image(format!("pull failed for {image}")));
        }
        Ok(())
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<String, DriverError> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("ctr-{}", state.next_id);
        state.containers.insert(id.clone(), spec.clone());
        Ok(id)
    }

    async fn start(&self, _handle: &str) -> Result<(), DriverError> {
        Ok(())
    }

    async fn inspect_addresses(&self, _handle: &str) -> Result<Vec<String>, DriverError> {
        Ok(vec!["127.0.0.1".to_string()])
    }

    async fn stop(&self, _handle: &str, _grace: Duration) -> Result<Disposal, DriverError> {
        Ok(Disposal::Done)
    }

    async fn remove(&self, handle: &str) -> Result<Disposal, DriverError> {
        let mut state = self.state.lock().unwrap();
        match state.containers.remove(handle) {
            Some(_) => Ok(Disposal::Done),
            None => Ok(Disposal::AlreadyGone),
        }
    }

    async fn list(&self, scope: &str) -> Result<Vec<ContainerSummary>, DriverError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .containers
            .iter()
            .filter(|(_, spec)| spec.labels.get(LABEL_SCOPE).map(String::as_str) == Some(scope))
            .map(|(id, spec)| ContainerSummary {
                id: id.clone(),
                name: spec.name.clone(),
                labels: spec.labels.clone(),
                running: true,
            })
            .collect())
    }
}

pub fn build_state(driver: FakeDriver) -> AppState {
    let config = RuntimeConfig {
        scope: "test".to_string(),
        ..Default::default()
    };
    let registry = Arc::new(SandboxRegistry::new());
    let hub = Arc::new(ObservationHub::new(registry.clone(), HubConfig::default()));
    let manager = Arc::new(SandboxManager::new(
        Arc::new(driver),
        registry.clone(),
        hub.clone(),
        config,
    ));
    let dispatcher = Arc::new(ActionDispatcher::new(
        registry,
        hub.clone(),
        reqwest::Client::new(),
    ));
    AppState {
        manager,
        dispatcher,
        hub,
    }
}
