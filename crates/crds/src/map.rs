//! Map CRD
//!
//! Declares a port-forward: traffic arriving at the worker pod on `port` is
//! relayed to `host:port` over the requested protocol.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// API group of the Map resource
pub const MAP_GROUP: &str = "forward.techsquad.rocks";

/// API version of the Map resource
pub const MAP_VERSION: &str = "v1beta1";

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "forward.techsquad.rocks",
    version = "v1beta1",
    kind = "Map",
    plural = "maps",
    namespaced,
    status = "MapStatus",
    printcolumn = r#"{"name":"Protocol","type":"string","jsonPath":".spec.protocol"}"#,
    printcolumn = r#"{"name":"Host","type":"string","jsonPath":".spec.host"}"#,
    printcolumn = r#"{"name":"Port","type":"integer","jsonPath":".spec.port"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#
)]
pub struct MapSpec {
    /// TCP/UDP protocol (matched case-insensitively)
    #[serde(default)]
    pub protocol: String,

    /// Port to listen on and to connect to on the destination host
    #[serde(default)]
    pub port: i32,

    /// Destination host
    #[serde(default)]
    pub host: String,

    /// Probe the destination from the worker pod
    #[serde(default)]
    pub liveness_probe: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
pub struct MapStatus {
    /// Lifecycle phase, written only by the controller
    #[serde(default)]
    pub phase: MapPhase,

    /// Terminal reason reported by the worker pod
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Terminal message reported by the worker pod
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Forward lifecycle phase
///
/// Serializes as `"PENDING"`, `"RUNNING"` or `"FAILED"`. A missing or empty
/// phase deserializes as `Pending`; any other value deserializes as
/// `Unknown` so one odd object cannot break decoding of a whole list.
/// The order of the first three variants is the only legal direction of
/// travel. `Unknown` is never written by the controller.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum MapPhase {
    /// Freshly observed, nothing done yet
    #[default]
    #[serde(alias = "")]
    Pending,

    /// Worker pod is (being) launched
    Running,

    /// Worker pod terminated; sticky
    Failed,

    /// Unrecognised value set by someone else; left untouched
    #[serde(other)]
    Unknown,
}

impl MapPhase {
    /// Wire representation of the phase
    pub fn as_str(self) -> &'static str {
        match self {
            MapPhase::Pending => "PENDING",
            MapPhase::Running => "RUNNING",
            MapPhase::Failed => "FAILED",
            MapPhase::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for MapPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Map {
    /// Current phase, treating an absent status as `Pending`
    pub fn phase(&self) -> MapPhase {
        self.status.as_ref().map(|s| s.phase).unwrap_or_default()
    }
}
