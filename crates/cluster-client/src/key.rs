//! Namespaced object keys

use crate::error::ClusterError;
use std::fmt;

/// Namespace used when an object carries no namespace of its own
pub const DEFAULT_NAMESPACE: &str = "default";

/// Identity of a namespaced object: `(namespace, name)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    /// Namespace of the object
    pub namespace: String,
    /// Name of the object
    pub name: String,
}

impl ObjectKey {
    /// Create a key from namespace and name
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of an existing object, read from its metadata
    ///
    /// A missing namespace falls back to `default`; a missing name is an error.
    pub fn for_resource<K: kube::Resource>(obj: &K) -> Result<Self, ClusterError> {
        let meta = obj.meta();
        let name = meta
            .name
            .clone()
            .ok_or_else(|| ClusterError::MissingMetadata("metadata.name".to_string()))?;
        let namespace = meta
            .namespace
            .clone()
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
        Ok(Self { namespace, name })
    }

    /// Key of a sibling object in the same namespace
    pub fn sibling(&self, name: impl Into<String>) -> Self {
        Self::new(self.namespace.clone(), name)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
