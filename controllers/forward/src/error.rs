//! Controller-specific error types.
//!
//! This module defines error types specific to the Forward Controller
//! that are not covered by upstream library errors.

use cluster_client::ClusterError;
use thiserror::Error;

/// Errors that can occur in the Forward Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Object store error
    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    /// Map is missing a metadata field needed to build its worker
    #[error("Missing metadata: {0}")]
    MissingMetadata(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// HTTP server error
    #[error("Server error: {0}")]
    Server(#[from] std::io::Error),

    /// Background task failed
    #[error("Task failed: {0}")]
    Task(String),
}
