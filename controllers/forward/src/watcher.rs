//! Kubernetes resource watchers.
//!
//! This module watches Map intents and the worker pods they own, and feeds
//! their keys to the reconciler through kube_runtime::Controller.
//!
//! Triggers are keys only: a Map change reconciles that Map, and a worker
//! pod change is routed to its owning Map through the controller owner
//! reference. The Controller never runs two passes for the same key at once,
//! coalesces bursts (debounce) and caps parallel keys (concurrency).

use crate::backoff::BackoffTracker;
use crate::compiler::{MANAGED_BY_LABEL, MANAGER_NAME};
use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::health::HealthState;
use crate::reconciler::{Disposition, Reconciler};
use cluster_client::ObjectKey;
use cluster_client::key::DEFAULT_NAMESPACE;
use crds::Map;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::{Api, Client, ResourceExt};
use kube_runtime::{
    Controller, watcher,
    controller::{self, Action, Config as RuntimeConfig},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// State shared by every reconciliation the Controller runs
#[derive(Debug)]
pub struct WatchContext {
    reconciler: Arc<Reconciler>,
    backoff: BackoffTracker,
}

impl WatchContext {
    /// Creates a new context with a fresh backoff tracker.
    pub fn new(reconciler: Arc<Reconciler>, config: &ControllerConfig) -> Self {
        Self {
            reconciler,
            backoff: BackoffTracker::new(config.backoff_min, config.backoff_max),
        }
    }
}

/// What the Controller should do after a successful pass
pub fn action_for(disposition: Disposition) -> Action {
    match disposition {
        Disposition::Done => Action::await_change(),
        Disposition::Requeue => Action::requeue(Duration::ZERO),
    }
}

fn backoff_key(map: &Map) -> String {
    ObjectKey::for_resource(map)
        .map(|key| key.to_string())
        .unwrap_or_else(|_| map.name_any())
}

async fn reconcile_map(map: Arc<Map>, ctx: Arc<WatchContext>) -> Result<Action, ControllerError> {
    let key = ObjectKey::for_resource(map.as_ref())?;
    let disposition = ctx.reconciler.reconcile(&key).await?;
    ctx.backoff.reset(&key.to_string());
    debug!("Map {} reconciled ({})", key, disposition.as_str());
    Ok(action_for(disposition))
}

fn error_policy(map: Arc<Map>, error: &ControllerError, ctx: Arc<WatchContext>) -> Action {
    let key = backoff_key(&map);
    let delay = ctx.backoff.next_for(&key);
    warn!(
        "Retrying Map {} in {:?} after error: {} ({} Maps backing off)",
        key,
        delay,
        error,
        ctx.backoff.tracked()
    );
    Action::requeue(delay)
}

/// Drop the backoff state of a Map the runtime reports as gone
///
/// A Map deleted while backing off never reaches `reconcile_map` again, so
/// its entry would otherwise stay in the tracker forever. Returns whether
/// `error` was such a deletion.
fn forget_deleted<Q>(ctx: &WatchContext, error: &controller::Error<ControllerError, Q>) -> bool
where
    Q: std::error::Error + 'static,
{
    let controller::Error::ObjectNotFound(obj_ref) = error else {
        return false;
    };
    let key = ObjectKey::new(
        obj_ref.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE),
        obj_ref.name.as_str(),
    );
    ctx.backoff.reset(&key.to_string());
    debug!("Map {} is gone, dropped its backoff state", key);
    true
}

/// Watches Maps and their worker pods.
#[derive(Debug)]
pub struct Watcher {
    context: Arc<WatchContext>,
    config: Arc<ControllerConfig>,
    health: Arc<HealthState>,
    map_api: Api<Map>,
    pod_api: Api<Pod>,
}

impl Watcher {
    /// Creates a new watcher scoped to the configured namespace.
    pub fn new(
        client: Client,
        reconciler: Arc<Reconciler>,
        config: Arc<ControllerConfig>,
        health: Arc<HealthState>,
    ) -> Self {
        let (map_api, pod_api) = match config.watch_namespace.as_deref() {
            Some(ns) => (Api::namespaced(client.clone(), ns), Api::namespaced(client, ns)),
            None => (Api::all(client.clone()), Api::all(client)),
        };
        Self {
            context: Arc::new(WatchContext::new(reconciler, &config)),
            config,
            health,
            map_api,
            pod_api,
        }
    }

    /// Watch Maps until a shutdown signal arrives.
    pub async fn watch_maps(&self) -> Result<(), ControllerError> {
        info!(
            "Starting {} watcher (owning {} workers) in {}",
            self.config.kinds.intent.plural,
            self.config.kinds.worker.kind,
            self.config.watch_namespace.as_deref().unwrap_or("all namespaces")
        );

        let runtime_config = RuntimeConfig::default()
            .debounce(self.config.debounce)
            .concurrency(self.config.concurrency);
        let worker_selector = format!("{}={}", MANAGED_BY_LABEL, MANAGER_NAME);

        let controller = Controller::new(self.map_api.clone(), watcher::Config::default())
            .owns(
                self.pod_api.clone(),
                watcher::Config::default().labels(&worker_selector),
            )
            .with_config(runtime_config)
            .shutdown_on_signal();

        self.health.mark_ready();

        let context = Arc::clone(&self.context);
        controller
            .run(reconcile_map, error_policy, Arc::clone(&self.context))
            .for_each(|res| {
                let context = Arc::clone(&context);
                async move {
                    match res {
                        Ok((obj, _action)) => debug!("Reconciled Map {}", obj),
                        Err(e) if forget_deleted(&context, &e) => {}
                        Err(e) => error!("Controller error for Map: {}", e),
                    }
                }
            })
            .await;

        info!("Map watcher stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use cluster_client::{MockClusterClient, MockFailure, MockOperation};
    use kube_runtime::reflector::ObjectRef;

    fn context(store: &MockClusterClient) -> Arc<WatchContext> {
        let (reconciler, _) = create_test_reconciler(store);
        let config = ControllerConfig {
            backoff_min: Duration::from_secs(5),
            backoff_max: Duration::from_secs(60),
            ..Default::default()
        };
        Arc::new(WatchContext::new(Arc::new(reconciler), &config))
    }

    fn same_action(left: &Action, right: &Action) -> bool {
        format!("{:?}", left) == format!("{:?}", right)
    }

    #[test]
    fn test_dispositions_map_to_actions() {
        assert!(same_action(&action_for(Disposition::Done), &Action::await_change()));
        assert!(same_action(
            &action_for(Disposition::Requeue),
            &Action::requeue(Duration::ZERO)
        ));
    }

    #[tokio::test]
    async fn test_error_policy_backs_off_per_key() {
        let store = MockClusterClient::new();
        let map = Arc::new(store.insert_map(create_test_map("web", "default", "tcp", "h", 1)));
        let ctx = context(&store);
        let err = ControllerError::InvalidConfig("boom".to_string());

        let delays: Vec<Action> = (0..4)
            .map(|_| error_policy(map.clone(), &err, ctx.clone()))
            .collect();

        assert!(same_action(&delays[0], &Action::requeue(Duration::from_secs(5))));
        assert!(same_action(&delays[1], &Action::requeue(Duration::from_secs(5))));
        assert!(same_action(&delays[2], &Action::requeue(Duration::from_secs(10))));
        assert!(same_action(&delays[3], &Action::requeue(Duration::from_secs(15))));
        assert_eq!(ctx.backoff.tracked(), 1);
    }

    #[tokio::test]
    async fn test_success_resets_backoff() {
        let store = MockClusterClient::new();
        let map = Arc::new(store.insert_map(create_test_map("web", "default", "tcp", "h", 1)));
        let ctx = context(&store);

        store.fail_next(MockOperation::GetMap, MockFailure::Unavailable);
        let err = reconcile_map(map.clone(), ctx.clone()).await.unwrap_err();
        error_policy(map.clone(), &err, ctx.clone());
        assert_eq!(ctx.backoff.tracked(), 1);

        let action = reconcile_map(map.clone(), ctx.clone()).await.unwrap();
        assert!(same_action(&action, &Action::await_change()));
        assert_eq!(ctx.backoff.tracked(), 0);
    }

    #[tokio::test]
    async fn test_deleted_map_drops_its_backoff() {
        let store = MockClusterClient::new();
        let map = Arc::new(store.insert_map(create_test_map("web", "default", "tcp", "h", 1)));
        let ctx = context(&store);
        let err = ControllerError::InvalidConfig("boom".to_string());
        error_policy(map.clone(), &err, ctx.clone());
        assert_eq!(ctx.backoff.tracked(), 1);

        let other: controller::Error<ControllerError, watcher::Error> =
            controller::Error::ReconcilerFailed(err, ObjectRef::from_obj(map.as_ref()).erase());
        assert!(!forget_deleted(&ctx, &other));
        assert_eq!(ctx.backoff.tracked(), 1);

        let gone: controller::Error<ControllerError, watcher::Error> =
            controller::Error::ObjectNotFound(ObjectRef::<Map>::new("web").within("default").erase());
        assert!(forget_deleted(&ctx, &gone));
        assert_eq!(ctx.backoff.tracked(), 0);
    }

    #[tokio::test]
    async fn test_conflict_requeues_immediately() {
        let store = MockClusterClient::new();
        let map = Arc::new(store.insert_map(create_test_map("web", "default", "tcp", "h", 1)));
        let ctx = context(&store);

        store.fail_next(MockOperation::UpdateMapStatus, MockFailure::Conflict);
        let action = reconcile_map(map, ctx).await.unwrap();
        assert!(same_action(&action, &Action::requeue(Duration::ZERO)));
    }
}
