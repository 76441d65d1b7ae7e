//! Prometheus metrics for the Forward Controller.
//!
//! The registry is owned by the controller and served on `/metrics`.

use crate::error::ControllerError;
use crds::MapPhase;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Controller metrics
#[derive(Debug, Clone)]
pub struct Metrics {
    registry: Registry,
    reconciliations: IntCounterVec,
    phase_transitions: IntCounterVec,
    workers_created: IntCounter,
}

impl Metrics {
    /// Create and register all controller metrics
    pub fn new() -> Result<Self, ControllerError> {
        let registry = Registry::new();

        let reconciliations = IntCounterVec::new(
            Opts::new("forward_reconcile_total", "Reconciliation passes by outcome"),
            &["outcome"],
        )?;
        let phase_transitions = IntCounterVec::new(
            Opts::new("forward_phase_transitions_total", "Persisted Map phase transitions"),
            &["from", "to"],
        )?;
        let workers_created = IntCounter::new(
            "forward_workers_created_total",
            "Worker pods created by the controller",
        )?;

        registry.register(Box::new(reconciliations.clone()))?;
        registry.register(Box::new(phase_transitions.clone()))?;
        registry.register(Box::new(workers_created.clone()))?;

        Ok(Self {
            registry,
            reconciliations,
            phase_transitions,
            workers_created,
        })
    }

    /// Count one reconciliation pass (`done`, `requeue` or `error`)
    pub fn record_outcome(&self, outcome: &str) {
        self.reconciliations.with_label_values(&[outcome]).inc();
    }

    /// Count a persisted phase change
    pub fn record_transition(&self, from: MapPhase, to: MapPhase) {
        self.phase_transitions
            .with_label_values(&[from.as_str(), to.as_str()])
            .inc();
    }

    /// Count a created worker pod
    pub fn record_worker_created(&self) {
        self.workers_created.inc();
    }

    /// Render all metrics in the Prometheus text format
    pub fn encode(&self) -> Result<String, ControllerError> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
