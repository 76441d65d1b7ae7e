//! Cluster client errors

use crate::key::ObjectKey;
use thiserror::Error;

/// Errors that can occur when talking to the cluster object store
///
/// `NotFound`, `AlreadyExists` and `Conflict` are observations rather than
/// failures; callers decide what each one means for them.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Object does not exist
    #[error("{kind} {key} not found")]
    NotFound {
        /// Object kind
        kind: &'static str,
        /// Object key
        key: ObjectKey,
    },

    /// Create raced with an existing object of the same name
    #[error("{kind} {key} already exists")]
    AlreadyExists {
        /// Object kind
        kind: &'static str,
        /// Object key
        key: ObjectKey,
    },

    /// Write was based on a stale resourceVersion
    #[error("{kind} {key} was modified concurrently")]
    Conflict {
        /// Object kind
        kind: &'static str,
        /// Object key
        key: ObjectKey,
    },

    /// Object is missing a metadata field the operation needs
    #[error("Missing metadata: {0}")]
    MissingMetadata(String),

    /// Store is temporarily unavailable
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Any other Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Classification of an API status code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ApiFailure {
    NotFound,
    AlreadyExists,
    Conflict,
}

/// Classify an API status by HTTP code and reason
///
/// 409 is shared by create collisions (`AlreadyExists`) and optimistic
/// concurrency failures (`Conflict`); the reason tells them apart.
pub(crate) fn classify(code: u16, reason: &str) -> Option<ApiFailure> {
    match (code, reason) {
        (404, _) => Some(ApiFailure::NotFound),
        (409, "AlreadyExists") => Some(ApiFailure::AlreadyExists),
        (409, _) => Some(ApiFailure::Conflict),
        _ => None,
    }
}

impl ClusterError {
    /// Convert a kube error for an operation on `kind`/`key`
    pub fn from_kube(err: kube::Error, kind: &'static str, key: &ObjectKey) -> Self {
        let failure = match &err {
            kube::Error::Api(status) => classify(status.code, &status.reason),
            _ => None,
        };
        let key = key.clone();
        match failure {
            Some(ApiFailure::NotFound) => Self::NotFound { kind, key },
            Some(ApiFailure::AlreadyExists) => Self::AlreadyExists { kind, key },
            Some(ApiFailure::Conflict) => Self::Conflict { kind, key },
            None => Self::Kube(err),
        }
    }

    /// Object does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Create collided with an existing object
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Write lost an optimistic concurrency race
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_not_found() {
        assert_eq!(classify(404, "NotFound"), Some(ApiFailure::NotFound));
        assert_eq!(classify(404, ""), Some(ApiFailure::NotFound));
    }

    #[test]
    fn test_classify_409_by_reason() {
        assert_eq!(classify(409, "AlreadyExists"), Some(ApiFailure::AlreadyExists));
        assert_eq!(classify(409, "Conflict"), Some(ApiFailure::Conflict));
    }

    #[test]
    fn test_classify_other_codes_are_unclassified() {
        assert_eq!(classify(500, "InternalError"), None);
        assert_eq!(classify(403, "Forbidden"), None);
        assert_eq!(classify(422, "Invalid"), None);
    }

    #[test]
    fn test_predicates() {
        let key = ObjectKey::new("default", "web");
        assert!(ClusterError::NotFound { kind: "Map", key: key.clone() }.is_not_found());
        assert!(ClusterError::AlreadyExists { kind: "Pod", key: key.clone() }.is_already_exists());
        assert!(ClusterError::Conflict { kind: "Map", key }.is_conflict());
        assert!(!ClusterError::Unavailable("down".to_string()).is_not_found());
    }

    #[test]
    fn test_display_names_kind_and_key() {
        let err = ClusterError::NotFound {
            kind: "Map",
            key: ObjectKey::new("default", "web"),
        };
        assert_eq!(err.to_string(), "Map default/web not found");
    }
}
