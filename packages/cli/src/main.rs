// ABOUTME: sandboxd server entrypoint wiring driver, registry, hub and dispatcher
// ABOUTME: Loads env configuration, initializes tracing and serves the HTTP API

use axum::http::{HeaderValue, Method};
use sandboxd_api::{create_router, AppState};
use sandboxd_runtime::{
    ActionDispatcher, ContainerDriver, DockerDriver, HubConfig, ObservationHub, SandboxManager,
    SandboxRegistry,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let driver = Arc::new(DockerDriver::connect()?);
    if !driver.is_available().await {
        warn!("docker daemon unreachable at startup; sandbox creation will fail until it returns");
    }

    let registry = Arc::new(SandboxRegistry::new());
    let hub = Arc::new(ObservationHub::new(registry.clone(), HubConfig::default()));
    let manager = Arc::new(SandboxManager::new(
        driver,
        registry.clone(),
        hub.clone(),
        config.runtime.clone(),
    ));

    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()?;
    let dispatcher = Arc::new(ActionDispatcher::new(registry, hub.clone(), http));

    let cors = CorsLayer::new()
        .allow_origin(config.cors_origin.parse::<HeaderValue>()?)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any);

    let app = create_router(AppState {
        manager,
        dispatcher,
        hub,
    })
    .layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.runtime.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, image = %config.runtime.image, scope = %config.runtime.scope, "sandboxd listening");

    axum::serve(listener, app).await?;

    Ok(())
}
