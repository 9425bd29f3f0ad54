//! Engine behavior against the in-memory store.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ResourceRequirements, Service};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use memcached_operator::controller::{ReconcileError, reconcile, record_failure};
use memcached_operator::crd::hub::{
    AutoscalingSpec, GracefulShutdownSpec, HighAvailabilitySpec,
    MemcachedSpec, MonitoringSpec, PdbSpec, ServiceConfig, ServiceMonitorSpec,
};
use memcached_operator::crd::{ConditionStatus, ConditionType};
use memcached_operator::store::{
    MemoryStore, ObjectKey, ObjectStore, StoreError, WriteCounts,
};
use memcached_operator::templates::{ChildKind, ChildObject, RenderOptions};

mod common;
use common::{key, memcached, seeded, seeded_with};

fn full_spec() -> MemcachedSpec {
    MemcachedSpec {
        replicas: Some(3),
        high_availability: Some(HighAvailabilitySpec {
            pod_disruption_budget: Some(PdbSpec {
                enabled: true,
                max_unavailable: Some(
                    k8s_openapi::apimachinery::pkg::util::intstr::IntOrString::Int(1),
                ),
                ..Default::default()
            }),
            ..Default::default()
        }),
        monitoring: Some(MonitoringSpec {
            enabled: true,
            service_monitor: Some(ServiceMonitorSpec::default()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

async fn deployment(store: &MemoryStore) -> Deployment {
    match store.child(ChildKind::Deployment, &key()).await {
        Some(ChildObject::Deployment(d)) => d,
        other => panic!("expected a deployment, got {other:?}"),
    }
}

#[test_log::test(tokio::test)]
async fn second_pass_makes_no_writes() {
    let (store, ctx) = seeded(full_spec()).await;
    let first = reconcile(&key(), &ctx).await.unwrap();
    assert_eq!(first.created, 4);
    assert!(first.status_written);

    store.reset_writes().await;
    let second = reconcile(&key(), &ctx).await.unwrap();
    assert_eq!(second.writes(), 0);
    assert_eq!(store.writes().await, WriteCounts::default());
}

#[test_log::test(tokio::test)]
async fn disabling_monitoring_deletes_only_the_service_monitor() {
    let (store, ctx) = seeded(full_spec()).await;
    reconcile(&key(), &ctx).await.unwrap();

    let mut mc = store.get_memcached(&key()).await.unwrap().unwrap();
    mc.spec.monitoring = None;
    store.put_memcached(mc).await;
    store.reset_writes().await;

    let out = reconcile(&key(), &ctx).await.unwrap();
    assert_eq!(out.deleted, 1);
    assert_eq!(out.created, 0);
    let kinds = store.child_kinds(&key()).await;
    assert!(!kinds.contains(&ChildKind::ServiceMonitor));
    assert!(kinds.contains(&ChildKind::PodDisruptionBudget));

    // exporter sidecar and metrics port went away with monitoring
    let dep = deployment(&store).await;
    let containers = dep.spec.unwrap().template.spec.unwrap().containers;
    assert_eq!(containers.len(), 1);
}

#[test_log::test(tokio::test)]
async fn service_monitor_toggle_off_leaves_existing_ones_alone() {
    let (store, ctx) = seeded(full_spec()).await;
    reconcile(&key(), &ctx).await.unwrap();

    let ctx = memcached_operator::controller::ReconcileContext::new(
        std::sync::Arc::new(store.clone()),
        RenderOptions {
            service_monitor: false,
        },
    );
    let out = reconcile(&key(), &ctx).await.unwrap();
    assert_eq!(out.deleted, 0);
    assert!(store.child(ChildKind::ServiceMonitor, &key()).await.is_some());
}

#[test_log::test(tokio::test)]
async fn absent_document_is_a_no_op() {
    let (store, ctx) = seeded(MemcachedSpec::default()).await;
    let missing = ObjectKey::new("prod", "gone");
    let out = reconcile(&missing, &ctx).await.unwrap();
    assert_eq!(out.writes(), 0);
    assert_eq!(store.writes().await.total(), 0);
}

#[test_log::test(tokio::test)]
async fn injected_conflict_is_transient() {
    let (store, ctx) = seeded(MemcachedSpec::default()).await;
    store
        .fail_next_write(StoreError::Conflict("prod/cache".into()))
        .await;
    let err = reconcile(&key(), &ctx).await.unwrap_err();
    assert!(matches!(err, ReconcileError::Transient(_)));

    // the retry converges
    let out = reconcile(&key(), &ctx).await.unwrap();
    assert_eq!(out.created, 2);
}

#[test_log::test(tokio::test)]
async fn forbidden_write_is_terminal_and_recorded() {
    let (store, ctx) = seeded(MemcachedSpec::default()).await;
    store
        .fail_next_write(StoreError::Api {
            code: 403,
            message: "forbidden".into(),
        })
        .await;
    let ReconcileError::Terminal(message) =
        reconcile(&key(), &ctx).await.unwrap_err()
    else {
        panic!("expected a terminal error");
    };
    record_failure(&key(), &message, &ctx).await.unwrap();

    let mc = store.get_memcached(&key()).await.unwrap().unwrap();
    let degraded = mc
        .status
        .unwrap()
        .conditions
        .into_iter()
        .find(|c| c.type_ == ConditionType::Degraded)
        .unwrap();
    assert_eq!(degraded.status, ConditionStatus::True);
    assert_eq!(degraded.reason.as_deref(), Some("ReconcileFailed"));
}

#[test_log::test(tokio::test)]
async fn drift_is_repaired_with_a_single_update() {
    let (store, ctx) = seeded(MemcachedSpec::default()).await;
    reconcile(&key(), &ctx).await.unwrap();

    let mut dep = deployment(&store).await;
    if let Some(spec) = dep.spec.as_mut() {
        spec.replicas = Some(7);
    }
    store.insert_child(&ChildObject::Deployment(dep)).await;
    store.reset_writes().await;

    let out = reconcile(&key(), &ctx).await.unwrap();
    assert_eq!(out.updated, 1);
    assert_eq!(deployment(&store).await.spec.unwrap().replicas, Some(1));
}

#[test_log::test(tokio::test)]
async fn disabling_graceful_shutdown_strips_the_hook() {
    let spec = MemcachedSpec {
        high_availability: Some(HighAvailabilitySpec {
            graceful_shutdown: Some(GracefulShutdownSpec {
                enabled: true,
                pre_stop_delay_seconds: 5,
                termination_grace_period_seconds: 20,
            }),
            ..Default::default()
        }),
        ..Default::default()
    };
    let (store, ctx) = seeded(spec).await;
    reconcile(&key(), &ctx).await.unwrap();
    let pod = deployment(&store).await.spec.unwrap().template.spec.unwrap();
    assert!(pod.containers[0].lifecycle.is_some());

    let mut mc = store.get_memcached(&key()).await.unwrap().unwrap();
    if let Some(gs) = mc
        .spec
        .high_availability
        .as_mut()
        .and_then(|ha| ha.graceful_shutdown.as_mut())
    {
        gs.enabled = false;
    }
    store.put_memcached(mc).await;
    store.reset_writes().await;

    let out = reconcile(&key(), &ctx).await.unwrap();
    assert_eq!(out.updated, 1);
    let pod = deployment(&store).await.spec.unwrap().template.spec.unwrap();
    assert!(pod.containers[0].lifecycle.is_none());
    assert_eq!(pod.termination_grace_period_seconds, None);

    let again = reconcile(&key(), &ctx).await.unwrap();
    assert_eq!(again.writes(), 0);
}

#[test_log::test(tokio::test)]
async fn removed_resources_and_annotations_are_cleared() {
    let spec = MemcachedSpec {
        resources: Some(ResourceRequirements {
            limits: Some(BTreeMap::from([(
                "memory".to_string(),
                Quantity("256Mi".into()),
            )])),
            ..Default::default()
        }),
        service: Some(ServiceConfig {
            annotations: BTreeMap::from([("a".to_string(), "b".to_string())]),
        }),
        ..Default::default()
    };
    let (store, ctx) = seeded(spec).await;
    reconcile(&key(), &ctx).await.unwrap();

    let mut mc = store.get_memcached(&key()).await.unwrap().unwrap();
    mc.spec.resources = None;
    mc.spec.service = None;
    store.put_memcached(mc).await;

    let out = reconcile(&key(), &ctx).await.unwrap();
    assert_eq!(out.updated, 2);
    let pod = deployment(&store).await.spec.unwrap().template.spec.unwrap();
    assert!(pod.containers[0].resources.is_none());
    let svc: Service = match store.child(ChildKind::Service, &key()).await {
        Some(ChildObject::Service(s)) => s,
        other => panic!("expected a service, got {other:?}"),
    };
    assert!(svc.metadata.annotations.is_none());
}

#[test_log::test(tokio::test)]
async fn enabling_autoscaling_creates_hpa_and_drops_fixed_replicas() {
    let (store, ctx) = seeded(MemcachedSpec::default()).await;
    reconcile(&key(), &ctx).await.unwrap();

    let mut mc = store.get_memcached(&key()).await.unwrap().unwrap();
    mc.spec.replicas = None;
    mc.spec.autoscaling = Some(AutoscalingSpec {
        enabled: true,
        min_replicas: Some(2),
        max_replicas: 6,
        ..Default::default()
    });
    store.put_memcached(mc).await;

    let out = reconcile(&key(), &ctx).await.unwrap();
    assert_eq!(out.created, 1);
    assert!(
        store
            .child(ChildKind::HorizontalPodAutoscaler, &key())
            .await
            .is_some()
    );
}

#[test_log::test(tokio::test)]
async fn invalid_autoscaling_bounds_fail_terminally() {
    let spec = MemcachedSpec {
        autoscaling: Some(AutoscalingSpec {
            enabled: true,
            max_replicas: 0,
            ..Default::default()
        }),
        ..Default::default()
    };
    let (store, ctx) = seeded_with(spec, RenderOptions::default()).await;
    let err = reconcile(&key(), &ctx).await.unwrap_err();
    assert!(matches!(err, ReconcileError::Terminal(_)));
    assert_eq!(store.writes().await.total(), 0);
}

#[test_log::test(tokio::test)]
async fn foreign_children_are_neither_adopted_nor_deleted() {
    let (store, ctx) = seeded(full_spec()).await;
    reconcile(&key(), &ctx).await.unwrap();

    // a ServiceMonitor with the same name owned by someone else
    let mut other = memcached(full_spec());
    other.metadata.uid = Some("someone-else".into());
    let mut sm = memcached_operator::templates::render_all(
        &other,
        &RenderOptions::default(),
    )
    .unwrap()
    .into_iter()
    .find(|c| c.kind() == ChildKind::ServiceMonitor)
    .unwrap();
    sm.meta_mut().resource_version = None;
    store.insert_child(&sm).await;

    let mut mc = store.get_memcached(&key()).await.unwrap().unwrap();
    mc.spec.monitoring = None;
    store.put_memcached(mc).await;
    let out = reconcile(&key(), &ctx).await.unwrap();
    assert_eq!(out.deleted, 0);
    assert!(store.child(ChildKind::ServiceMonitor, &key()).await.is_some());
}
