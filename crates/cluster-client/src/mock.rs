//! Mock ClusterClient for unit testing
//!
//! This module provides an in-memory implementation of `ClusterClientTrait`
//! that behaves like the API server for the operations the controller uses:
//! resource versions are bumped on every write, stale status writes conflict,
//! and creating a taken name reports `AlreadyExists`.

use crate::cluster_trait::ClusterClientTrait;
use crate::error::ClusterError;
use crate::key::{DEFAULT_NAMESPACE, ObjectKey};
use crds::Map;
use k8s_openapi::api::core::v1::{Pod, PodStatus};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Barrier;

/// Store operation, used for call counting and fault injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    /// `get_map`
    GetMap,
    /// `list_maps`
    ListMaps,
    /// `update_map_status`
    UpdateMapStatus,
    /// `get_pod`
    GetPod,
    /// `create_pod`
    CreatePod,
}

/// Failure to return from the next call of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// Transient store error
    Unavailable,
    /// Optimistic concurrency failure
    Conflict,
    /// Name already taken
    AlreadyExists,
    /// Object missing
    NotFound,
}

/// Mock ClusterClient for testing
///
/// Clones share storage, so a test can hand one clone to the reconciler and
/// inspect the store through another.
#[derive(Clone, Default, Debug)]
pub struct MockClusterClient {
    maps: Arc<Mutex<HashMap<ObjectKey, Map>>>,
    pods: Arc<Mutex<HashMap<ObjectKey, Pod>>>,
    failures: Arc<Mutex<HashMap<MockOperation, MockFailure>>>,
    calls: Arc<Mutex<HashMap<MockOperation, usize>>>,
    rendezvous: Arc<Mutex<HashMap<MockOperation, Arc<Barrier>>>>,
    resource_version: Arc<Mutex<u64>>,
}

impl MockClusterClient {
    /// Create an empty mock store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a Map to the store (for test setup)
    ///
    /// Fills in namespace, uid and resourceVersion when missing and returns
    /// the stored object.
    pub fn insert_map(&self, mut map: Map) -> Map {
        if map.metadata.namespace.is_none() {
            map.metadata.namespace = Some(DEFAULT_NAMESPACE.to_string());
        }
        if map.metadata.uid.is_none() {
            map.metadata.uid = Some(uuid::Uuid::new_v4().to_string());
        }
        map.metadata.resource_version = Some(self.next_version());
        let key = key_of(&map);
        self.maps.lock().unwrap().insert(key, map.clone());
        map
    }

    /// Delete a Map from the store (simulates user deletion)
    pub fn remove_map(&self, key: &ObjectKey) -> Option<Map> {
        self.maps.lock().unwrap().remove(key)
    }

    /// Current stored Map
    pub fn map(&self, key: &ObjectKey) -> Option<Map> {
        self.maps.lock().unwrap().get(key).cloned()
    }

    /// Current stored Pod
    pub fn pod(&self, key: &ObjectKey) -> Option<Pod> {
        self.pods.lock().unwrap().get(key).cloned()
    }

    /// Number of Pods in the store
    pub fn pod_count(&self) -> usize {
        self.pods.lock().unwrap().len()
    }

    /// Add a Pod to the store (for test setup)
    pub fn insert_pod(&self, mut pod: Pod) -> Pod {
        if pod.metadata.namespace.is_none() {
            pod.metadata.namespace = Some(DEFAULT_NAMESPACE.to_string());
        }
        pod.metadata.resource_version = Some(self.next_version());
        let key = key_of(&pod);
        self.pods.lock().unwrap().insert(key, pod.clone());
        pod
    }

    /// Simulate the kubelet reporting a Pod phase
    pub fn set_pod_phase(&self, key: &ObjectKey, phase: &str, reason: Option<&str>, message: Option<&str>) {
        let version = self.next_version();
        let mut pods = self.pods.lock().unwrap();
        if let Some(pod) = pods.get_mut(key) {
            pod.status = Some(PodStatus {
                phase: Some(phase.to_string()),
                reason: reason.map(str::to_string),
                message: message.map(str::to_string),
                ..Default::default()
            });
            pod.metadata.resource_version = Some(version);
        }
    }

    /// Make the next call of `op` fail with `failure`
    pub fn fail_next(&self, op: MockOperation, failure: MockFailure) {
        self.failures.lock().unwrap().insert(op, failure);
    }

    /// Hold every call of `op` until `parties` callers have reached it
    ///
    /// Lets a test line up concurrent callers so they all act on the same
    /// snapshot, e.g. two passes that both saw no worker before creating one.
    pub fn rendezvous_before(&self, op: MockOperation, parties: usize) {
        self.rendezvous
            .lock()
            .unwrap()
            .insert(op, Arc::new(Barrier::new(parties)));
    }

    /// Number of times `op` has been called
    pub fn calls(&self, op: MockOperation) -> usize {
        self.calls.lock().unwrap().get(&op).copied().unwrap_or(0)
    }

    /// Wait at the rendezvous for `op`, if one is set
    async fn checkpoint(&self, op: MockOperation) {
        let barrier = self.rendezvous.lock().unwrap().get(&op).cloned();
        if let Some(barrier) = barrier {
            barrier.wait().await;
        }
    }

    fn next_version(&self) -> String {
        let mut version = self.resource_version.lock().unwrap();
        *version += 1;
        version.to_string()
    }

    /// Count the call and take any injected failure for it
    fn enter(&self, op: MockOperation, kind: &'static str, key: &ObjectKey) -> Result<(), ClusterError> {
        *self.calls.lock().unwrap().entry(op).or_insert(0) += 1;
        let failure = self.failures.lock().unwrap().remove(&op);
        let key = key.clone();
        match failure {
            None => Ok(()),
            Some(MockFailure::Unavailable) => Err(ClusterError::Unavailable(format!("injected failure on {:?}", op))),
            Some(MockFailure::Conflict) => Err(ClusterError::Conflict { kind, key }),
            Some(MockFailure::AlreadyExists) => Err(ClusterError::AlreadyExists { kind, key }),
            Some(MockFailure::NotFound) => Err(ClusterError::NotFound { kind, key }),
        }
    }
}

fn key_of<K: kube::Resource>(obj: &K) -> ObjectKey {
    let meta = obj.meta();
    ObjectKey::new(
        meta.namespace.clone().unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
        meta.name.clone().unwrap_or_default(),
    )
}

#[async_trait::async_trait]
impl ClusterClientTrait for MockClusterClient {
    async fn get_map(&self, key: &ObjectKey) -> Result<Map, ClusterError> {
        self.checkpoint(MockOperation::GetMap).await;
        self.enter(MockOperation::GetMap, "Map", key)?;
        self.map(key).ok_or_else(|| ClusterError::NotFound {
            kind: "Map",
            key: key.clone(),
        })
    }

    async fn list_maps(&self, namespace: Option<&str>) -> Result<Vec<Map>, ClusterError> {
        self.checkpoint(MockOperation::ListMaps).await;
        self.enter(MockOperation::ListMaps, "Map", &ObjectKey::new(namespace.unwrap_or(""), ""))?;
        let mut maps: Vec<Map> = self
            .maps
            .lock()
            .unwrap()
            .iter()
            .filter(|(key, _)| namespace.is_none_or(|ns| key.namespace == ns))
            .map(|(_, map)| map.clone())
            .collect();
        maps.sort_by(|a, b| key_of(a).cmp(&key_of(b)));
        Ok(maps)
    }

    async fn update_map_status(&self, map: &Map) -> Result<Map, ClusterError> {
        self.checkpoint(MockOperation::UpdateMapStatus).await;
        let key = ObjectKey::for_resource(map)?;
        self.enter(MockOperation::UpdateMapStatus, "Map", &key)?;

        let version = self.next_version();
        let mut maps = self.maps.lock().unwrap();
        let stored = maps.get_mut(&key).ok_or_else(|| ClusterError::NotFound {
            kind: "Map",
            key: key.clone(),
        })?;

        if let Some(expected) = map.metadata.resource_version.as_deref() {
            if stored.metadata.resource_version.as_deref() != Some(expected) {
                return Err(ClusterError::Conflict { kind: "Map", key });
            }
        }

        stored.status = map.status.clone();
        stored.metadata.resource_version = Some(version);
        Ok(stored.clone())
    }

    async fn get_pod(&self, key: &ObjectKey) -> Result<Pod, ClusterError> {
        self.checkpoint(MockOperation::GetPod).await;
        self.enter(MockOperation::GetPod, "Pod", key)?;
        self.pod(key).ok_or_else(|| ClusterError::NotFound {
            kind: "Pod",
            key: key.clone(),
        })
    }

    async fn create_pod(&self, pod: &Pod) -> Result<Pod, ClusterError> {
        self.checkpoint(MockOperation::CreatePod).await;
        let key = ObjectKey::for_resource(pod)?;
        self.enter(MockOperation::CreatePod, "Pod", &key)?;

        let version = self.next_version();
        let mut pods = self.pods.lock().unwrap();
        if pods.contains_key(&key) {
            return Err(ClusterError::AlreadyExists { kind: "Pod", key });
        }

        let mut created = pod.clone();
        created.metadata.namespace = Some(key.namespace.clone());
        created.metadata.uid = Some(uuid::Uuid::new_v4().to_string());
        created.metadata.resource_version = Some(version);
        created.status = Some(PodStatus {
            phase: Some("Pending".to_string()),
            ..Default::default()
        });
        pods.insert(key, created.clone());
        Ok(created)
    }
}
