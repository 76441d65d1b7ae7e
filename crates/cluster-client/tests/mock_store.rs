//! Behavioural tests for the in-memory cluster client
//!
//! The reconciler's tests lean on these semantics matching the API server.

use cluster_client::{ClusterClientTrait, MockClusterClient, MockFailure, MockOperation, ObjectKey};
use crds::{Map, MapPhase, MapSpec, MapStatus};
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

fn test_map(name: &str) -> Map {
    Map::new(
        name,
        MapSpec {
            protocol: "tcp".to_string(),
            host: "10.0.0.5".to_string(),
            port: 9090,
            liveness_probe: false,
        },
    )
}

fn test_pod(name: &str) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

#[tokio::test]
async fn test_get_missing_map_is_not_found() {
    let store = MockClusterClient::new();
    let err = store.get_map(&ObjectKey::new("default", "web")).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_status_update_does_not_touch_spec() {
    let store = MockClusterClient::new();
    let stored = store.insert_map(test_map("web"));

    let mut edited = stored.clone();
    edited.spec.port = 1;
    edited.status = Some(MapStatus {
        phase: MapPhase::Running,
        ..Default::default()
    });
    store.update_map_status(&edited).await.unwrap();

    let after = store.map(&ObjectKey::new("default", "web")).unwrap();
    assert_eq!(after.spec.port, 9090);
    assert_eq!(after.phase(), MapPhase::Running);
}

#[tokio::test]
async fn test_stale_status_update_conflicts() {
    let store = MockClusterClient::new();
    let stored = store.insert_map(test_map("web"));

    let mut first = stored.clone();
    first.status = Some(MapStatus {
        phase: MapPhase::Running,
        ..Default::default()
    });
    store.update_map_status(&first).await.unwrap();

    // Second writer still holds the original resourceVersion
    let mut second = stored;
    second.status = Some(MapStatus {
        phase: MapPhase::Failed,
        ..Default::default()
    });
    let err = store.update_map_status(&second).await.unwrap_err();
    assert!(err.is_conflict());

    let after = store.map(&ObjectKey::new("default", "web")).unwrap();
    assert_eq!(after.phase(), MapPhase::Running);
}

#[tokio::test]
async fn test_duplicate_create_reports_already_exists() {
    let store = MockClusterClient::new();
    store.create_pod(&test_pod("forward-web-pod")).await.unwrap();

    let err = store.create_pod(&test_pod("forward-web-pod")).await.unwrap_err();
    assert!(err.is_already_exists());
    assert_eq!(store.pod_count(), 1);
}

#[tokio::test]
async fn test_created_pod_starts_pending_with_uid() {
    let store = MockClusterClient::new();
    let created = store.create_pod(&test_pod("forward-web-pod")).await.unwrap();

    assert!(created.metadata.uid.is_some());
    let phase = created.status.and_then(|s| s.phase);
    assert_eq!(phase.as_deref(), Some("Pending"));
}

#[tokio::test]
async fn test_injected_failure_is_one_shot() {
    let store = MockClusterClient::new();
    store.insert_map(test_map("web"));
    store.fail_next(MockOperation::GetMap, MockFailure::Unavailable);

    let key = ObjectKey::new("default", "web");
    assert!(matches!(
        store.get_map(&key).await,
        Err(cluster_client::ClusterError::Unavailable(_))
    ));
    assert!(store.get_map(&key).await.is_ok());
    assert_eq!(store.calls(MockOperation::GetMap), 2);
}

#[tokio::test]
async fn test_list_maps_filters_by_namespace() {
    let store = MockClusterClient::new();
    store.insert_map(test_map("web"));
    let mut other = test_map("db");
    other.metadata.namespace = Some("edge".to_string());
    store.insert_map(other);

    assert_eq!(store.list_maps(None).await.unwrap().len(), 2);
    let edge = store.list_maps(Some("edge")).await.unwrap();
    assert_eq!(edge.len(), 1);
    assert_eq!(edge[0].metadata.name.as_deref(), Some("db"));
}

#[tokio::test]
async fn test_rendezvous_holds_callers_until_all_arrive() {
    let store = MockClusterClient::new();
    store.rendezvous_before(MockOperation::CreatePod, 2);
    let pod = test_pod("forward-web-pod");

    let (a, b) = tokio::join!(store.create_pod(&pod), store.create_pod(&pod));

    // Exactly one wins; the other sees the object the winner created
    assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
    let loser = if a.is_ok() { b } else { a };
    assert!(loser.unwrap_err().is_already_exists());
    assert_eq!(store.calls(MockOperation::CreatePod), 2);
    assert_eq!(store.pod_count(), 1);
}

#[tokio::test]
async fn test_rendezvous_blocks_a_lone_caller() {
    let store = MockClusterClient::new();
    store.rendezvous_before(MockOperation::CreatePod, 2);

    let lone = tokio::time::timeout(
        std::time::Duration::from_millis(50),
        store.create_pod(&test_pod("forward-web-pod")),
    )
    .await;

    assert!(lone.is_err());
    assert_eq!(store.calls(MockOperation::CreatePod), 0);
    assert_eq!(store.pod_count(), 0);
}
