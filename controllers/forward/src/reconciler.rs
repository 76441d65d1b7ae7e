//! Reconciliation logic for Map intents.
//!
//! One pass takes a Map key, fetches fresh state from the store, evaluates
//! the phase state machine and performs at most one worker create and at
//! most one status write. Nothing is cached between passes, so any number
//! of passes for the same key (including concurrent ones) converge.

use crate::compiler;
use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::metrics::Metrics;
use crate::phase::{self, PhaseAction, Transition, WorkerObservation};
use cluster_client::{ClusterClientTrait, ObjectKey};
use crds::{Map, MapPhase, MapStatus};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// Outcome of a successful reconciliation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Nothing more to do until the Map or its worker changes
    Done,
    /// Run another pass right away (state moved under us)
    Requeue,
}

impl Disposition {
    /// Label used in metrics and logs
    pub fn as_str(self) -> &'static str {
        match self {
            Disposition::Done => "done",
            Disposition::Requeue => "requeue",
        }
    }
}

/// Reconciles Map intents against their worker pods.
pub struct Reconciler {
    pub(crate) client: Box<dyn ClusterClientTrait>,
    config: Arc<ControllerConfig>,
    metrics: Arc<Metrics>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Creates a new reconciler instance.
    pub fn new(
        client: impl ClusterClientTrait + 'static,
        config: Arc<ControllerConfig>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            client: Box::new(client),
            config,
            metrics,
        }
    }

    /// Reconcile the Map identified by `key`.
    ///
    /// `Err` means the pass failed and should be retried with backoff.
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<Disposition, ControllerError> {
        let span = info_span!(
            "reconcile",
            kind = %self.config.kinds.intent.kind,
            namespace = %key.namespace,
            name = %key.name
        );
        let result = self.reconcile_map(key).instrument(span).await;

        match &result {
            Ok(disposition) => self.metrics.record_outcome(disposition.as_str()),
            Err(e) => {
                error!("Reconciliation failed for Map {}: {}", key, e);
                self.metrics.record_outcome("error");
            }
        }
        result
    }

    async fn reconcile_map(&self, key: &ObjectKey) -> Result<Disposition, ControllerError> {
        info!("Reconciling Map {}", key);

        let map = match self.client.get_map(key).await {
            Ok(map) => map,
            Err(e) if e.is_not_found() => {
                // Deleted before this pass ran; the worker goes with it via GC.
                debug!("Map {} no longer exists, nothing to do", key);
                return Ok(Disposition::Done);
            }
            Err(e) => return Err(e.into()),
        };

        let current = map.phase();
        let observation = if phase::requires_worker_observation(current) {
            Some(self.observe_worker(key).await?)
        } else {
            None
        };
        let transition = phase::evaluate(current, observation.as_ref());
        if let Some(WorkerObservation::Terminated { outcome, .. }) = &observation {
            debug!("Worker for Map {} ended as {:?}", key, outcome);
        }

        match &transition.action {
            PhaseAction::None => match current {
                MapPhase::Pending => info!(
                    "Map {} pending, waiting to forward to {}:{}",
                    key, map.spec.host, map.spec.port
                ),
                MapPhase::Running => debug!(
                    "Worker for Map {} is active, waiting for it to change",
                    key
                ),
                MapPhase::Failed => info!(
                    "Map {} has failed: check that {}:{} is reachable from the cluster and that no network policy or firewall rule blocks it",
                    key, map.spec.host, map.spec.port
                ),
                MapPhase::Unknown => info!(
                    "Map {} has an unrecognised phase, leaving it untouched",
                    key
                ),
            },
            PhaseAction::CreateWorker => self.ensure_worker(&map, key).await?,
            PhaseAction::RecordTerminal { reason, message } => info!(
                "Worker for Map {} terminated (reason: {}, message: {})",
                key,
                reason.as_deref().unwrap_or("-"),
                message.as_deref().unwrap_or("-")
            ),
        }

        if !transition.write_status {
            return Ok(Disposition::Done);
        }
        self.write_status(map, current, &transition, key).await
    }

    /// Fetch the worker pod and classify it
    async fn observe_worker(&self, key: &ObjectKey) -> Result<WorkerObservation, ControllerError> {
        let worker_key = key.sibling(compiler::worker_name(&key.name));
        match self.client.get_pod(&worker_key).await {
            Ok(pod) => Ok(WorkerObservation::from_pod(&pod)),
            Err(e) if e.is_not_found() => Ok(WorkerObservation::Absent),
            Err(e) => Err(e.into()),
        }
    }

    /// Create the worker pod; an existing one counts as success
    async fn ensure_worker(&self, map: &Map, key: &ObjectKey) -> Result<(), ControllerError> {
        let worker = compiler::compile(&map.spec);
        if worker.is_diagnostic() {
            warn!(
                "Map {} requests unsupported protocol {:?}; worker will only report the socat version",
                key, map.spec.protocol
            );
        }

        let pod = compiler::worker_pod(map, &worker, &self.config)?;
        match self.client.create_pod(&pod).await {
            Ok(created) => {
                info!(
                    "Worker {} launched for Map {}",
                    created.metadata.name.as_deref().unwrap_or_default(),
                    key
                );
                self.metrics.record_worker_created();
                Ok(())
            }
            Err(e) if e.is_already_exists() => {
                debug!("Worker for Map {} already exists (created by an earlier pass)", key);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Persist the phase chosen by `transition`
    ///
    /// The write carries the resourceVersion we read, so a concurrent writer
    /// surfaces as a conflict and the next pass recomputes from fresh state.
    async fn write_status(
        &self,
        mut map: Map,
        current: MapPhase,
        transition: &Transition,
        key: &ObjectKey,
    ) -> Result<Disposition, ControllerError> {
        let (reason, message) = match &transition.action {
            PhaseAction::RecordTerminal { reason, message } => (reason.clone(), message.clone()),
            _ => (None, None),
        };
        map.status = Some(MapStatus {
            phase: transition.next,
            reason,
            message,
        });

        match self.client.update_map_status(&map).await {
            Ok(_) => {
                info!("Map {} phase {} -> {}", key, current, transition.next);
                if current != transition.next {
                    self.metrics.record_transition(current, transition.next);
                }
                Ok(Disposition::Done)
            }
            Err(e) if e.is_conflict() => {
                debug!("Status of Map {} changed concurrently, requeueing", key);
                Ok(Disposition::Requeue)
            }
            Err(e) if e.is_not_found() => {
                debug!("Map {} deleted before its status could be written", key);
                Ok(Disposition::Done)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Log a per-phase summary of the Maps visible at startup.
    ///
    /// Read-only: the watch delivers every existing Map for reconciliation
    /// anyway; this only makes the starting state visible in the logs.
    pub async fn startup_inventory(&self) -> Result<BTreeMap<MapPhase, usize>, ControllerError> {
        let maps = self
            .client
            .list_maps(self.config.watch_namespace.as_deref())
            .await?;

        let mut counts: BTreeMap<MapPhase, usize> = BTreeMap::new();
        for map in &maps {
            *counts.entry(map.phase()).or_insert(0) += 1;
        }

        info!(
            "Found {} Maps: {} pending, {} running, {} failed, {} unrecognised",
            maps.len(),
            counts.get(&MapPhase::Pending).copied().unwrap_or(0),
            counts.get(&MapPhase::Running).copied().unwrap_or(0),
            counts.get(&MapPhase::Failed).copied().unwrap_or(0),
            counts.get(&MapPhase::Unknown).copied().unwrap_or(0)
        );
        Ok(counts)
    }
}
