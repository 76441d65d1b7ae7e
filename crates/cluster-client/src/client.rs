//! Kubernetes-backed cluster client
//!
//! Implements `ClusterClientTrait` on top of `kube::Api` for `Map` and `Pod`.

use crate::cluster_trait::ClusterClientTrait;
use crate::error::ClusterError;
use crate::key::{DEFAULT_NAMESPACE, ObjectKey};
use crds::Map;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Client};
use tracing::debug;

const MAP_KIND: &str = "Map";
const POD_KIND: &str = "Pod";

/// Cluster client backed by the Kubernetes API server
#[derive(Clone)]
pub struct ClusterClient {
    client: Client,
}

impl std::fmt::Debug for ClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterClient").finish_non_exhaustive()
    }
}

impl ClusterClient {
    /// Wrap an existing kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the in-cluster or kubeconfig environment
    pub async fn try_default() -> Result<Self, ClusterError> {
        Ok(Self::new(Client::try_default().await?))
    }

    /// Underlying kube client (used to set up watches)
    pub fn kube_client(&self) -> Client {
        self.client.clone()
    }

    fn maps(&self, namespace: &str) -> Api<Map> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait::async_trait]
impl ClusterClientTrait for ClusterClient {
    async fn get_map(&self, key: &ObjectKey) -> Result<Map, ClusterError> {
        debug!("Fetching Map {}", key);
        self.maps(&key.namespace)
            .get(&key.name)
            .await
            .map_err(|e| ClusterError::from_kube(e, MAP_KIND, key))
    }

    async fn list_maps(&self, namespace: Option<&str>) -> Result<Vec<Map>, ClusterError> {
        let api: Api<Map> = match namespace {
            Some(ns) => self.maps(ns),
            None => Api::all(self.client.clone()),
        };
        let list = api.list(&ListParams::default()).await?;
        Ok(list.items)
    }

    async fn update_map_status(&self, map: &Map) -> Result<Map, ClusterError> {
        let key = ObjectKey::for_resource(map)?;
        let status = serde_json::to_value(&map.status)?;

        // resourceVersion in a merge patch acts as a precondition: the API
        // server answers 409 if the stored object has moved on.
        let patch = match map.metadata.resource_version.as_deref() {
            Some(rv) => serde_json::json!({
                "metadata": { "resourceVersion": rv },
                "status": status,
            }),
            None => serde_json::json!({ "status": status }),
        };

        debug!("Patching status of Map {}", key);
        self.maps(&key.namespace)
            .patch_status(&key.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| ClusterError::from_kube(e, MAP_KIND, &key))
    }

    async fn get_pod(&self, key: &ObjectKey) -> Result<Pod, ClusterError> {
        debug!("Fetching Pod {}", key);
        self.pods(&key.namespace)
            .get(&key.name)
            .await
            .map_err(|e| ClusterError::from_kube(e, POD_KIND, key))
    }

    async fn create_pod(&self, pod: &Pod) -> Result<Pod, ClusterError> {
        let key = ObjectKey::for_resource(pod)?;
        let namespace = pod
            .metadata
            .namespace
            .as_deref()
            .unwrap_or(DEFAULT_NAMESPACE);

        debug!("Creating Pod {}", key);
        self.pods(namespace)
            .create(&PostParams::default(), pod)
            .await
            .map_err(|e| ClusterError::from_kube(e, POD_KIND, &key))
    }
}
