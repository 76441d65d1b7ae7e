//! Desired-state compiler.
//!
//! Turns a `MapSpec` into the worker it implies. `compile` is pure and
//! deterministic; `worker_pod` only adds the identity and ownership fields
//! taken from the Map itself.

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crds::{Map, MapSpec};
use k8s_openapi::api::core::v1::{Container, ExecAction, Pod, PodSpec, Probe};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use serde::Serialize;
use std::collections::BTreeMap;

/// Label used to select worker pods when watching
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Value of `MANAGED_BY_LABEL` on worker pods
pub const MANAGER_NAME: &str = "forward-controller";

/// Name of the single container in a worker pod
pub const WORKER_CONTAINER: &str = "map";

/// Relay the worker runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Relay {
    /// Bidirectional TCP relay
    Tcp,
    /// UDP datagram relay
    Udp,
    /// Unsupported protocol: the worker only prints the socat version
    Diagnostic,
}

impl Relay {
    /// Pick the relay for a protocol name (case-insensitive)
    pub fn for_protocol(protocol: &str) -> Self {
        if protocol.eq_ignore_ascii_case("tcp") {
            Relay::Tcp
        } else if protocol.eq_ignore_ascii_case("udp") {
            Relay::Udp
        } else {
            Relay::Diagnostic
        }
    }
}

/// Fully derived description of a worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerSpec {
    /// Relay selected from the protocol
    pub relay: Relay,
    /// Process invocation
    pub command: Vec<String>,
    /// Liveness check invocation
    pub liveness_command: Vec<String>,
    /// Pod restart policy
    pub restart_policy: String,
}

impl WorkerSpec {
    /// True when the protocol was not recognised
    pub fn is_diagnostic(&self) -> bool {
        self.relay == Relay::Diagnostic
    }
}

/// Compile a Map spec into a worker spec
pub fn compile(spec: &MapSpec) -> WorkerSpec {
    let relay = Relay::for_protocol(&spec.protocol);
    let port = spec.port;
    let host = &spec.host;

    let command: Vec<String> = match relay {
        Relay::Tcp => vec![
            "socat".to_string(),
            "-d".to_string(),
            "-d".to_string(),
            format!("tcp-listen:{},fork,reuseaddr", port),
            format!("tcp-connect:{}:{}", host, port),
        ],
        Relay::Udp => vec![
            "socat".to_string(),
            "-d".to_string(),
            "-d".to_string(),
            format!("UDP4-RECVFROM:{},fork,reuseaddr", port),
            format!("UDP4-SENDTO:{}:{}", host, port),
        ],
        Relay::Diagnostic => vec!["socat".to_string(), "-V".to_string()],
    };

    let liveness_command = if spec.liveness_probe {
        vec![
            "nc".to_string(),
            "-v".to_string(),
            "-n".to_string(),
            "-z".to_string(),
            host.clone(),
            port.to_string(),
        ]
    } else {
        vec!["echo".to_string()]
    };

    WorkerSpec {
        relay,
        command,
        liveness_command,
        restart_policy: "OnFailure".to_string(),
    }
}

/// Name of the worker pod for a Map
pub fn worker_name(map_name: &str) -> String {
    format!("forward-{}-pod", map_name)
}

/// Build the worker pod for `map`
///
/// The pod lives in the Map's namespace and carries a controller owner
/// reference back to it, so deleting the Map garbage-collects the pod and
/// pod events are routed to the Map's key.
pub fn worker_pod(map: &Map, worker: &WorkerSpec, config: &ControllerConfig) -> Result<Pod, ControllerError> {
    let name = map
        .metadata
        .name
        .as_ref()
        .ok_or_else(|| ControllerError::MissingMetadata("Map missing metadata.name".to_string()))?;
    let uid = map
        .metadata
        .uid
        .as_ref()
        .ok_or_else(|| ControllerError::MissingMetadata(format!("Map {} missing metadata.uid", name)))?;

    let owner = OwnerReference {
        api_version: config.kinds.intent.api_version.clone(),
        kind: config.kinds.intent.kind.clone(),
        name: name.clone(),
        uid: uid.clone(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    };

    let labels = BTreeMap::from([
        ("app".to_string(), name.clone()),
        (MANAGED_BY_LABEL.to_string(), MANAGER_NAME.to_string()),
    ]);

    Ok(Pod {
        metadata: ObjectMeta {
            name: Some(worker_name(name)),
            namespace: map.metadata.namespace.clone(),
            labels: Some(labels),
            owner_references: Some(vec![owner]),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![Container {
                name: WORKER_CONTAINER.to_string(),
                image: Some(config.worker_image.clone()),
                command: Some(worker.command.clone()),
                liveness_probe: Some(Probe {
                    exec: Some(ExecAction {
                        command: Some(worker.liveness_command.clone()),
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }],
            restart_policy: Some(worker.restart_policy.clone()),
            ..Default::default()
        }),
        status: None,
    })
}
