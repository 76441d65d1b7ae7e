//! ClusterClient trait for mocking
//!
//! This trait abstracts the object store so the reconciler can be unit tested
//! against an in-memory implementation.

use crate::error::ClusterError;
use crate::key::ObjectKey;
use crds::Map;
use k8s_openapi::api::core::v1::Pod;

/// Trait for object store operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ClusterClientTrait: Send + Sync {
    /// Fetch a Map intent
    async fn get_map(&self, key: &ObjectKey) -> Result<Map, ClusterError>;

    /// List Map intents in one namespace, or in all namespaces
    async fn list_maps(&self, namespace: Option<&str>) -> Result<Vec<Map>, ClusterError>;

    /// Persist `map.status` through the status subresource
    ///
    /// The write is conditional on `map.metadata.resourceVersion` when set and
    /// returns `Conflict` if the stored object moved on. Spec is never written.
    async fn update_map_status(&self, map: &Map) -> Result<Map, ClusterError>;

    /// Fetch a worker Pod
    async fn get_pod(&self, key: &ObjectKey) -> Result<Pod, ClusterError>;

    /// Create a worker Pod; `AlreadyExists` if the name is taken
    async fn create_pod(&self, pod: &Pod) -> Result<Pod, ClusterError>;
}
