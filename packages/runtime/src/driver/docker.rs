// ABOUTME: Docker implementation of the container driver using the bollard client
// ABOUTME: Every backend call is wrapped in its per-operation timeout budget

use super::{
    ContainerDriver, ContainerSpec, ContainerSummary, Disposal, DriverError, CREATE_TIMEOUT,
    INSPECT_TIMEOUT, LABEL_SCOPE, PULL_TIMEOUT, REMOVE_TIMEOUT, START_TIMEOUT, STOP_TIMEOUT,
};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::Docker;
use futures::StreamExt;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

type Result<T> = std::result::Result<T, DriverError>;

pub struct DockerDriver {
    client: Docker,
}

/// Bound a backend call to its budget; the inner result still carries the
/// backend error for per-call mapping.
async fn bounded<T, F>(
    op: &'static str,
    budget: Duration,
    fut: F,
) -> Result<std::result::Result<T, bollard::errors::Error>>
where
    F: Future<Output = std::result::Result<T, bollard::errors::Error>>,
{
    tokio::time::timeout(budget, fut)
        .await
        .map_err(|_| DriverError::Timeout { op, budget })
}

fn is_not_found(err: &bollard::errors::Error) -> bool {
    matches!(
        err,
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

fn is_not_modified(err: &bollard::errors::Error) -> bool {
    matches!(
        err,
        bollard::errors::Error::DockerResponseServerError {
            status_code: 304,
            ..
        }
    )
}

impl DockerDriver {
    pub fn connect() -> Result<Self> {
        let client = Docker::connect_with_defaults()
            .map_err(|e| DriverError::Connection(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Docker) -> Self {
        Self { client }
    }

    async fn image_exists(&self, image: &str) -> Result<bool> {
        match bounded("image inspect", INSPECT_TIMEOUT, self.client.inspect_image(image)).await? {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(DriverError::Image(e.to_string())),
        }
    }

    /// Pull `image`, draining the progress stream to completion so the image
    /// is fully materialized before we report success.
    async fn pull_image(&self, image: &str) -> Result<()> {
        info!(%image, "pulling image");

        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };
        let mut stream = self.client.create_image(Some(options), None, None);

        let drained = tokio::time::timeout(PULL_TIMEOUT, async {
            let mut last_status = String::new();
            while let Some(progress) = stream.next().await {
                let info = progress.map_err(|e| {
                    DriverError::Image(format!("failed to pull image {image}: {e}"))
                })?;
                if let Some(error) = info.error {
                    return Err(DriverError::Image(format!(
                        "failed to pull image {image}: {error}"
                    )));
                }
                if let Some(status) = info.status {
                    if status != last_status {
                        debug!(%image, %status, "pull progress");
                        last_status = status;
                    }
                }
            }
            Ok(())
        })
        .await;

        match drained {
            Ok(result) => result,
            Err(_) => Err(DriverError::Timeout {
                op: "image pull",
                budget: PULL_TIMEOUT,
            }),
        }
    }

    fn to_container_config(spec: &ContainerSpec) -> Config<String> {
        let env: Vec<String> = spec
            .env
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();

        let mut exposed_ports = HashMap::new();
        exposed_ports.insert(format!("{}/tcp", spec.exposed_port), HashMap::new());

        Config {
            image: Some(spec.image.clone()),
            env: Some(env),
            labels: Some(spec.labels.clone()),
            exposed_ports: Some(exposed_ports),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ContainerDriver for DockerDriver {
    async fn is_available(&self) -> bool {
        match self.client.ping().await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "docker daemon not reachable");
                false
            }
        }
    }

    async fn ensure_image(&self, image: &str) -> Result<()> {
        if self.image_exists(image).await? {
            debug!(%image, "image present locally, skipping pull");
            return Ok(());
        }

        self.pull_image(image).await?;

        // A pull that "succeeded" without materializing the image is a bug in
        // the backend or the reference; surface it instead of failing later.
        if !self.image_exists(image).await? {
            return Err(DriverError::Image(format!(
                "image {image} not present locally after pull"
            )));
        }

        info!(%image, "image pull completed");
        Ok(())
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<String> {
        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };
        let config = Self::to_container_config(spec);

        let created = bounded(
            "container create",
            CREATE_TIMEOUT,
            self.client.create_container(Some(options), config),
        )
        .await?
        .map_err(|e| DriverError::Container(e.to_string()))?;

        debug!(container_id = %created.id, name = %spec.name, "container created");
        Ok(created.id)
    }

    async fn start(&self, handle: &str) -> Result<()> {
        bounded(
            "container start",
            START_TIMEOUT,
            self.client
                .start_container(handle, None::<StartContainerOptions<String>>),
        )
        .await?
        .map_err(|e| DriverError::Container(e.to_string()))
    }

    async fn inspect_addresses(&self, handle: &str) -> Result<Vec<String>> {
        let inspect = bounded(
            "container inspect",
            INSPECT_TIMEOUT,
            self.client.inspect_container(handle, None),
        )
        .await?
        .map_err(|e| DriverError::Container(e.to_string()))?;

        let mut addresses = Vec::new();
        if let Some(settings) = inspect.network_settings {
            if let Some(networks) = settings.networks {
                for endpoint in networks.values() {
                    if let Some(ip) = &endpoint.ip_address {
                        if !ip.is_empty() {
                            addresses.push(ip.clone());
                        }
                    }
                }
            }
            if addresses.is_empty() {
                if let Some(ip) = settings.ip_address {
                    if !ip.is_empty() {
                        addresses.push(ip);
                    }
                }
            }
        }

        Ok(addresses)
    }

    async fn stop(&self, handle: &str, grace: Duration) -> Result<Disposal> {
        let options = StopContainerOptions {
            t: grace.as_secs() as i64,
        };

        match bounded(
            "container stop",
            STOP_TIMEOUT,
            self.client.stop_container(handle, Some(options)),
        )
        .await?
        {
            Ok(()) => Ok(Disposal::Done),
            // 304: already stopped, 404: already removed.
            Err(e) if is_not_modified(&e) => Ok(Disposal::Done),
            Err(e) if is_not_found(&e) => Ok(Disposal::AlreadyGone),
            Err(e) => Err(DriverError::Container(e.to_string())),
        }
    }

    async fn remove(&self, handle: &str) -> Result<Disposal> {
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };

        match bounded(
            "container remove",
            REMOVE_TIMEOUT,
            self.client.remove_container(handle, Some(options)),
        )
        .await?
        {
            Ok(()) => Ok(Disposal::Done),
            Err(e) if is_not_found(&e) => Ok(Disposal::AlreadyGone),
            Err(e) => Err(DriverError::Container(e.to_string())),
        }
    }

    async fn list(&self, scope: &str) -> Result<Vec<ContainerSummary>> {
        let mut filters = HashMap::new();
        filters.insert(
            "label".to_string(),
            vec![format!("{}={}", LABEL_SCOPE, scope)],
        );

        let options = ListContainersOptions {
            all: true,
            filters,
            ..Default::default()
        };

        let containers = bounded(
            "container list",
            INSPECT_TIMEOUT,
            self.client.list_containers(Some(options)),
        )
        .await?
        .map_err(|e| DriverError::Container(e.to_string()))?;

        let summaries = containers
            .into_iter()
            .filter_map(|c| {
                let id = c.id?;
                let name = c
                    .names
                    .as_ref()
                    .and_then(|names| names.first())
                    .map(|n| n.trim_start_matches('/').to_string())
                    .unwrap_or_else(|| id.clone());
                Some(ContainerSummary {
                    id,
                    name,
                    labels: c.labels.unwrap_or_default(),
                    running: c.state.as_deref() == Some("running"),
                })
            })
            .collect();

        Ok(summaries)
    }
}
