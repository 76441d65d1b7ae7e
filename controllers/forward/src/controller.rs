//! Main controller implementation.
//!
//! This module contains the `Controller` struct that wires the store
//! client, reconciler, watcher and probe server together and runs them.

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::health::{self, HealthState};
use crate::metrics::Metrics;
use crate::reconciler::Reconciler;
use crate::watcher::Watcher;
use cluster_client::ClusterClient;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Main controller for Map forward intents.
#[derive(Debug)]
pub struct Controller {
    watcher: JoinHandle<Result<(), ControllerError>>,
    server: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance and starts its tasks.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing Forward Controller");
        let config = Arc::new(config);

        let cluster_client = ClusterClient::try_default().await?;
        let kube_client = cluster_client.kube_client();

        let metrics = Arc::new(Metrics::new()?);
        let reconciler = Arc::new(Reconciler::new(
            cluster_client,
            Arc::clone(&config),
            Arc::clone(&metrics),
        ));

        info!("Taking inventory of existing Maps...");
        if let Err(e) = reconciler.startup_inventory().await {
            warn!("Startup inventory failed (will continue): {}", e);
        }

        let health_state = Arc::new(HealthState::new(metrics));
        let server = {
            let state = Arc::clone(&health_state);
            let port = config.http_port;
            tokio::spawn(async move { health::run_server(state, port).await })
        };

        let watcher_instance = Watcher::new(kube_client, reconciler, Arc::clone(&config), health_state);
        let watcher = tokio::spawn(async move { watcher_instance.watch_maps().await });

        Ok(Self { watcher, server })
    }

    /// Runs until the watcher stops (shutdown signal) or a task fails.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("Forward Controller running");

        tokio::select! {
            result = &mut self.watcher => {
                result.map_err(|e| ControllerError::Task(format!("Map watcher panicked: {}", e)))??;
                info!("Shutting down");
                self.server.abort();
            }
            result = &mut self.server => {
                result.map_err(|e| ControllerError::Task(format!("HTTP server panicked: {}", e)))??;
                return Err(ControllerError::Task("HTTP server exited unexpectedly".to_string()));
            }
        }

        Ok(())
    }
}
