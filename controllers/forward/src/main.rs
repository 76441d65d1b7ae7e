//! Forward Controller
//!
//! Drives `Map` intents (forward a TCP or UDP port to a host reachable from
//! the cluster) to supervised socat worker pods:
//! - Pending: the Map is accepted and promoted to Running
//! - Running: exactly one worker pod exists for the Map
//! - Failed: the worker terminated; the Map stays Failed until deleted

mod backoff;
mod compiler;
mod config;
mod controller;
mod error;
mod health;
mod metrics;
mod phase;
mod reconciler;
#[cfg(test)]
mod test_utils;
mod watcher;

use anyhow::Context;
use config::ControllerConfig;
use controller::Controller;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = rustls::crypto::ring::default_provider().install_default();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Forward Controller");

    let config = ControllerConfig::from_env().context("failed to load configuration")?;

    info!("Configuration:");
    info!("  Namespace: {}", config.watch_namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Worker image: {}", config.worker_image);
    info!("  HTTP port: {}", config.http_port);
    info!(
        "  Concurrency: {}, debounce: {:?}, backoff: {:?}..{:?}",
        config.concurrency, config.debounce, config.backoff_min, config.backoff_max
    );

    let controller = Controller::new(config)
        .await
        .context("failed to initialize controller")?;
    controller.run().await.context("controller stopped with an error")?;

    Ok(())
}
