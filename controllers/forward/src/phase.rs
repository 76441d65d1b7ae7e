//! Phase state machine for Map intents.
//!
//! Each pass re-derives the next step from the observed state only, so
//! duplicated or reordered triggers are harmless:
//!
//! | Phase   | Worker observed | Action          | Next    | Status write |
//! |---------|-----------------|-----------------|---------|--------------|
//! | Pending | -               | none            | Running | yes          |
//! | Running | absent          | create worker   | Running | no           |
//! | Running | active          | none            | Running | no           |
//! | Running | terminated      | record terminal | Failed  | yes          |
//! | Failed  | -               | none            | Failed  | no           |
//! | Unknown | -               | none            | Unknown | no           |
//!
//! Failed is sticky. A phase the controller does not recognise is left alone.

use crds::MapPhase;
use k8s_openapi::api::core::v1::Pod;

/// How a terminated worker ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalOutcome {
    /// Pod phase `Succeeded`
    Succeeded,
    /// Pod phase `Failed`
    Failed,
}

/// What the reconciler saw of the worker pod
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerObservation {
    /// No worker pod exists
    Absent,
    /// Worker pod exists and has not terminated
    Active,
    /// Worker pod reached a terminal phase
    Terminated {
        /// Terminal pod phase
        outcome: TerminalOutcome,
        /// `status.reason` of the pod
        reason: Option<String>,
        /// `status.message` of the pod
        message: Option<String>,
    },
}

impl WorkerObservation {
    /// Observe an existing pod
    pub fn from_pod(pod: &Pod) -> Self {
        let Some(status) = pod.status.as_ref() else {
            return WorkerObservation::Active;
        };
        let outcome = match status.phase.as_deref() {
            Some("Succeeded") => TerminalOutcome::Succeeded,
            Some("Failed") => TerminalOutcome::Failed,
            _ => return WorkerObservation::Active,
        };
        WorkerObservation::Terminated {
            outcome,
            reason: status.reason.clone(),
            message: status.message.clone(),
        }
    }
}

/// Side effect a transition asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseAction {
    /// Nothing to do
    None,
    /// Create the worker pod
    CreateWorker,
    /// Copy the worker's terminal reason/message into the Map status
    RecordTerminal {
        /// Terminal reason
        reason: Option<String>,
        /// Terminal message
        message: Option<String>,
    },
}

/// Result of evaluating the state machine once
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Side effect to perform
    pub action: PhaseAction,
    /// Phase after this pass
    pub next: MapPhase,
    /// Whether the Map status must be persisted
    pub write_status: bool,
}

/// Whether evaluating `phase` needs the worker pod to be fetched
pub fn requires_worker_observation(phase: MapPhase) -> bool {
    phase == MapPhase::Running
}

/// Pending (or empty) always promotes to Running
pub fn pending() -> Transition {
    Transition {
        action: PhaseAction::None,
        next: MapPhase::Running,
        write_status: true,
    }
}

/// Running converges on exactly one worker and watches it terminate
pub fn running(observation: &WorkerObservation) -> Transition {
    match observation {
        WorkerObservation::Absent => Transition {
            action: PhaseAction::CreateWorker,
            next: MapPhase::Running,
            write_status: false,
        },
        WorkerObservation::Active => Transition {
            action: PhaseAction::None,
            next: MapPhase::Running,
            write_status: false,
        },
        WorkerObservation::Terminated { reason, message, .. } => Transition {
            action: PhaseAction::RecordTerminal {
                reason: reason.clone(),
                message: message.clone(),
            },
            next: MapPhase::Failed,
            write_status: true,
        },
    }
}

/// Failed stays Failed
pub fn failed() -> Transition {
    Transition {
        action: PhaseAction::None,
        next: MapPhase::Failed,
        write_status: false,
    }
}

/// Unrecognised phases are not ours to change
pub fn unknown() -> Transition {
    Transition {
        action: PhaseAction::None,
        next: MapPhase::Unknown,
        write_status: false,
    }
}

/// Evaluate the state machine for `phase`
///
/// `observation` is only consulted for Running; callers may pass `None`
/// for other phases. A Running Map without an observation is treated as
/// having no worker.
pub fn evaluate(phase: MapPhase, observation: Option<&WorkerObservation>) -> Transition {
    match phase {
        MapPhase::Pending => pending(),
        MapPhase::Running => running(observation.unwrap_or(&WorkerObservation::Absent)),
        MapPhase::Failed => failed(),
        MapPhase::Unknown => unknown(),
    }
}
