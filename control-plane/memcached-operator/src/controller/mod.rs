pub mod diff;
pub mod queue;
pub mod reconcile;
pub mod retry;
pub mod status;

use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use k8s_openapi::api::apps::v1::Deployment;
use kube::runtime::{WatchStreamExt, watcher};
use kube::{Api, Client, ResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::OperatorConfig;
use crate::crd::hub::Memcached;
use crate::store::{KubeStore, ObjectKey, ObjectStore};
use crate::templates::{RenderOptions, managed_by_selector, owner_name};

pub use queue::WorkQueue;
pub use reconcile::{
    ReconcileContext, ReconcileError, ReconcileOutcome, reconcile,
    record_failure,
};
pub use retry::{Backoff, RetryScheduler};

/// Watch Memcached documents and their Deployments and reconcile them until
/// `cancel` fires.
pub async fn run_controller(
    client: Client,
    cfg: OperatorConfig,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let store: Arc<dyn ObjectStore> =
        Arc::new(KubeStore::new(client.clone(), cfg.field_manager.clone()));
    let render = RenderOptions {
        service_monitor: cfg.features.service_monitor,
    };
    let ctx = ReconcileContext::new(store, render).with_cancel(cancel.clone());
    let queue = WorkQueue::new(cfg.worker.queue_capacity);
    let retry = Arc::new(RetryScheduler::new(Backoff::new(
        Duration::from_millis(cfg.retry.base_ms),
        Duration::from_millis(cfg.retry.cap_ms),
    )));

    let (memcacheds, deployments): (Api<Memcached>, Api<Deployment>) =
        match cfg.watch_namespace.as_deref() {
            Some(ns) => (
                Api::namespaced(client.clone(), ns),
                Api::namespaced(client, ns),
            ),
            None => (Api::all(client.clone()), Api::all(client)),
        };
    info!(
        namespace = cfg.watch_namespace.as_deref().unwrap_or("*"),
        workers = cfg.worker.workers,
        "starting memcached controller"
    );

    let memcached_events = watcher(memcacheds, watcher::Config::default())
        .default_backoff()
        .touched_objects()
        .map(|res| res.map(|mc| ObjectKey::of(&mc)));
    let deployment_events = watcher(
        deployments,
        watcher::Config::default().labels(&managed_by_selector()),
    )
    .default_backoff()
    .touched_objects()
    .map(|res| res.map(|d| owner_key(&d)));

    let mut tasks = tokio::task::JoinSet::new();
    tasks.spawn(feed(
        "memcached",
        memcached_events,
        queue.clone(),
        cancel.clone(),
    ));
    tasks.spawn(feed(
        "deployment",
        deployment_events,
        queue.clone(),
        cancel.clone(),
    ));
    for id in 0..cfg.worker.workers.max(1) {
        tasks.spawn(run_worker(id, queue.clone(), retry.clone(), ctx.clone()));
    }

    while let Some(res) = tasks.join_next().await {
        if let Err(e) = res {
            error!(error = %e, "controller task failed");
            cancel.cancel();
        }
    }
    info!("memcached controller stopped");
    Ok(())
}

fn owner_key(d: &Deployment) -> Option<ObjectKey> {
    let name = owner_name(&d.metadata)?;
    Some(ObjectKey::new(d.namespace()?, name))
}

/// Forward keys from a watch stream into the queue.
async fn feed<S, E>(
    source: &'static str,
    events: S,
    queue: Arc<WorkQueue>,
    cancel: CancellationToken,
) where
    S: Stream<Item = Result<Option<ObjectKey>, E>>,
    E: std::fmt::Display,
{
    let mut events = pin!(events);
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = events.next() => next,
        };
        match next {
            Some(Ok(Some(key))) => {
                debug!(%source, %key, "watch event");
                queue.add(key).await;
            }
            Some(Ok(None)) => {}
            Some(Err(e)) => warn!(%source, error = %e, "watch error"),
            None => break,
        }
    }
}

/// Pull keys until cancelled. Transient failures are retried with backoff,
/// terminal ones are written to status and wait for the next event.
pub async fn run_worker(
    id: usize,
    queue: Arc<WorkQueue>,
    retry: Arc<RetryScheduler>,
    ctx: ReconcileContext,
) {
    while let Some(key) = queue.next(&ctx.cancel).await {
        match reconcile(&key, &ctx).await {
            Ok(outcome) => {
                retry.forget(&key).await;
                debug!(worker = id, %key, ?outcome, "reconciled");
            }
            Err(ReconcileError::Cancelled) => {}
            Err(ReconcileError::Transient(e)) => {
                let delay = retry.next_delay(&key).await;
                warn!(
                    worker = id,
                    %key,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "transient reconcile failure, retrying"
                );
                queue.add_after(key.clone(), delay, ctx.cancel.clone());
            }
            Err(ReconcileError::Terminal(message)) => {
                retry.forget(&key).await;
                error!(worker = id, %key, %message, "reconcile failed");
                if let Err(e) = record_failure(&key, &message, &ctx).await {
                    warn!(worker = id, %key, error = %e, "cannot record failure");
                }
            }
        }
        queue.done(&key).await;
    }
    debug!(worker = id, "worker stopped");
}
