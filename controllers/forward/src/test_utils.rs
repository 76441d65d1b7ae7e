//! Test utilities for unit testing the reconciler
//!
//! This module provides helpers for creating test data and setting up test scenarios.

#[cfg(test)]
use crate::compiler;
#[cfg(test)]
use crate::config::ControllerConfig;
#[cfg(test)]
use crate::metrics::Metrics;
#[cfg(test)]
use crate::reconciler::Reconciler;
#[cfg(test)]
use cluster_client::{MockClusterClient, ObjectKey};
#[cfg(test)]
use crds::{Map, MapPhase, MapSpec, MapStatus};
#[cfg(test)]
use std::sync::Arc;

/// Helper to create a test Map
#[cfg(test)]
pub fn create_test_map(name: &str, namespace: &str, protocol: &str, host: &str, port: i32) -> Map {
    let mut map = Map::new(
        name,
        MapSpec {
            protocol: protocol.to_string(),
            port,
            host: host.to_string(),
            liveness_probe: true,
        },
    );
    map.metadata.namespace = Some(namespace.to_string());
    map
}

/// Helper to create a test Map already in `phase`
#[cfg(test)]
pub fn create_test_map_in_phase(name: &str, namespace: &str, phase: MapPhase) -> Map {
    let mut map = create_test_map(name, namespace, "tcp", "10.0.0.5", 9090);
    map.status = Some(MapStatus {
        phase,
        ..Default::default()
    });
    map
}

/// Key of the worker pod belonging to the Map at `key`
#[cfg(test)]
pub fn worker_key(key: &ObjectKey) -> ObjectKey {
    key.sibling(compiler::worker_name(&key.name))
}

/// Helper to create a reconciler over a shared mock store
///
/// Clones of the mock share state, so `store` keeps observing every write.
#[cfg(test)]
pub fn create_test_reconciler(store: &MockClusterClient) -> (Reconciler, Arc<Metrics>) {
    let metrics = Arc::new(Metrics::new().unwrap());
    let reconciler = Reconciler::new(
        store.clone(),
        Arc::new(ControllerConfig::default()),
        Arc::clone(&metrics),
    );
    (reconciler, metrics)
}
