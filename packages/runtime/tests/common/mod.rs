// ABOUTME: Shared test doubles for runtime integration tests
// ABOUTME: FakeDriver keeps container state in memory with injectable failures

use async_trait::async_trait;
use sandboxd_runtime::driver::{
    ContainerDriver, ContainerSpec, ContainerSummary, Disposal, DriverError, LABEL_SCOPE,
};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct FakeContainer {
    pub id: String,
    pub name: String,
    pub env: HashMap<String, String>,
    pub labels: HashMap<String, String>,
    pub running: bool,
}

#[derive(Default)]
struct FakeState {
    images: HashSet<String>,
    containers: HashMap<String, FakeContainer>,
    next_id: u64,
}

/// In-memory stand-in for the container backend.
pub struct FakeDriver {
    state: Mutex<FakeState>,
    addresses: Vec<String>,
    fail_pull: bool,
    fail_start: bool,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            addresses: vec!["10.4.0.2".to_string()],
            fail_pull: false,
            fail_start: false,
        }
    }

    pub fn with_addresses(mut self, addresses: Vec<&str>) -> Self {
        self.addresses = addresses.into_iter().map(String::from).collect();
        self
    }

    pub fn failing_pull(mut self) -> Self {
        self.fail_pull = true;
        self
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn container_count(&self) -> usize {
        self.state.lock().unwrap().containers.len()
    }

    pub fn containers(&self) -> Vec<FakeContainer> {
        self.state
            .lock()
            .unwrap()
            .containers
            .values()
            .cloned()
            .collect()
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
        self.state.lock().unwrap().images.insert(image.to_string());
        Ok(())
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<String, DriverError> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("ctr-{}", state.next_id);
        state.containers.insert(
            id.clone(),
            FakeContainer {
                id: id.clone(),
                name: spec.name.clone(),
                env: spec.env.clone(),
                labels: spec.labels.clone(),
                running: false,
            },
        );
        Ok(id)
    }

    async fn start(&self, handle: &str) -> Result<(), DriverError> {
        if self.fail_start {
            return Err(DriverError::Container(format!(
                "start failed for {handle}"
            )));
        }
        let mut state = self.state.lock().unwrap();
        match state.containers.get_mut(handle) {
            Some(container) => {
                container.running = true;
                Ok(())
            }
            None => Err(DriverError::Container(format!("no such container {handle}"))),
        }
    }

    async fn inspect_addresses(&self, handle: &str) -> Result<Vec<String>, DriverError> {
        let state = self.state.lock().unwrap();
        if !state.containers.contains_key(handle) {
            return Err(DriverError::Container(format!("no such container {handle}")));
        }
        Ok(self.addresses.clone())
    }

    async fn stop(&self, handle: &str, _grace: Duration) -> Result<Disposal, DriverError> {
        let mut state = self.state.lock().unwrap();
        match state.containers.get_mut(handle) {
            Some(container) => {
                container.running = false;
                Ok(Disposal::Done)
            }
            None => Ok(Disposal::AlreadyGone),
        }
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
            .values()
            .filter(|c| c.labels.get(LABEL_SCOPE).map(String::as_str) == Some(scope))
            .map(|c| ContainerSummary {
                id: c.id.clone(),
                name: c.name.clone(),
                labels: c.labels.clone(),
                running: c.running,
            })
            .collect())
    }
}
