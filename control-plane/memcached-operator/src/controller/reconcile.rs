use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::admission::defaulter::default_spec;
use crate::crd::hub::{Memcached, MemcachedStatus};
use crate::store::{ObjectKey, ObjectStore, StoreError, StoreResult};
use crate::templates::{
    BuildError, ChildKind, ChildObject, RenderOptions, render_all,
};

use super::diff::drifted_fields;
use super::status::{
    available, degraded, reconciled, should_patch_status, upsert_conditions,
};

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Retried with backoff.
    #[error("transient: {0}")]
    Transient(#[source] StoreError),
    /// Recorded on the document; retried on the next change.
    #[error("{0}")]
    Terminal(String),
    #[error("reconcile cancelled")]
    Cancelled,
}

impl From<StoreError> for ReconcileError {
    fn from(e: StoreError) -> Self {
        if e.is_transient() {
            ReconcileError::Transient(e)
        } else {
            ReconcileError::Terminal(e.to_string())
        }
    }
}

impl From<BuildError> for ReconcileError {
    fn from(e: BuildError) -> Self {
        ReconcileError::Terminal(e.to_string())
    }
}

impl From<serde_json::Error> for ReconcileError {
    fn from(e: serde_json::Error) -> Self {
        ReconcileError::Terminal(e.to_string())
    }
}

/// Writes issued by one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub status_written: bool,
}

impl ReconcileOutcome {
    pub fn writes(&self) -> usize {
        self.created + self.updated + self.deleted + self.status_written as usize
    }
}

#[derive(Clone)]
pub struct ReconcileContext {
    pub store: Arc<dyn ObjectStore>,
    pub render: RenderOptions,
    pub cancel: CancellationToken,
}

impl ReconcileContext {
    pub fn new(store: Arc<dyn ObjectStore>, render: RenderOptions) -> Self {
        Self {
            store,
            render,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run a store call unless the pass is cancelled first.
    async fn call<T>(
        &self,
        fut: impl Future<Output = StoreResult<T>>,
    ) -> Result<T, ReconcileError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ReconcileError::Cancelled),
            res = fut => res.map_err(ReconcileError::from),
        }
    }
}

/// Converge the children and status of one Memcached.
#[instrument(skip_all, fields(ns = %key.namespace, name = %key.name))]
pub async fn reconcile(
    key: &ObjectKey,
    ctx: &ReconcileContext,
) -> Result<ReconcileOutcome, ReconcileError> {
    let mut outcome = ReconcileOutcome::default();
    let Some(mc) = ctx.call(ctx.store.get_memcached(key)).await? else {
        trace!("memcached not found, nothing to do");
        return Ok(outcome);
    };
    if mc.metadata.deletion_timestamp.is_some() {
        // children go with the owner through garbage collection
        debug!("memcached is being deleted");
        return Ok(outcome);
    }
    let uid = mc.metadata.uid.clone().unwrap_or_default();
    let desired = render_all(&mc, &ctx.render)?;

    let mut live_deployment = None;
    for child in &desired {
        let kind = child.kind();
        let child_key = ObjectKey::new(&key.namespace, child.name());
        let live = ctx.call(ctx.store.get_child(kind, &child_key)).await?;
        let Some(live) = live else {
            ctx.call(ctx.store.create_child(child)).await?;
            info!(%kind, child = %child_key.name, "created");
            outcome.created += 1;
            continue;
        };
        if let Some(other) = foreign_controller(&live, &uid) {
            return Err(ReconcileError::Terminal(format!(
                "{kind} {} is controlled by {other}",
                child_key.name
            )));
        }
        let drift = drifted_fields(kind, &child.to_value()?, &live.to_value()?);
        if drift.is_empty() {
            trace!(%kind, child = %child_key.name, "up to date");
        } else {
            let mut update = child.clone();
            update.meta_mut().resource_version =
                live.meta().resource_version.clone();
            ctx.call(ctx.store.update_child(&update)).await?;
            info!(%kind, child = %child_key.name, ?drift, "updated");
            outcome.updated += 1;
        }
        if kind == ChildKind::Deployment {
            live_deployment = Some(live);
        }
    }

    for kind in ctx.render.managed_kinds() {
        if desired.iter().any(|c| c.kind() == kind) {
            continue;
        }
        let live = ctx.call(ctx.store.get_child(kind, key)).await?;
        match live {
            Some(live) if live.is_controlled_by(&uid) => {
                ctx.call(ctx.store.delete_child(kind, key)).await?;
                info!(%kind, "deleted");
                outcome.deleted += 1;
            }
            Some(_) => {
                debug!(%kind, "not controlled by this memcached, leaving it");
            }
            None => {}
        }
    }

    let status = desired_status(&mc, ready_replicas(live_deployment.as_ref()));
    if should_patch_status(mc.status.as_ref(), &status) {
        let rv = mc.metadata.resource_version.as_deref();
        ctx.call(ctx.store.patch_status(key, rv, &status)).await?;
        outcome.status_written = true;
    }
    debug!(?outcome, "reconcile pass finished");
    Ok(outcome)
}

/// Record a terminal failure as `Degraded=True` on the document.
#[instrument(skip_all, fields(ns = %key.namespace, name = %key.name))]
pub async fn record_failure(
    key: &ObjectKey,
    message: &str,
    ctx: &ReconcileContext,
) -> Result<(), ReconcileError> {
    let Some(mc) = ctx.call(ctx.store.get_memcached(key)).await? else {
        return Ok(());
    };
    let current = mc.status.clone().unwrap_or_default();
    let now = Utc::now().to_rfc3339();
    let status = MemcachedStatus {
        conditions: upsert_conditions(
            &current.conditions,
            vec![degraded(message)],
            &now,
        ),
        ..current
    };
    if should_patch_status(mc.status.as_ref(), &status) {
        warn!(%message, "recording reconcile failure");
        let rv = mc.metadata.resource_version.as_deref();
        ctx.call(ctx.store.patch_status(key, rv, &status)).await?;
    }
    Ok(())
}

fn foreign_controller(live: &ChildObject, uid: &str) -> Option<String> {
    live.meta()
        .owner_references
        .iter()
        .flatten()
        .find(|o| o.controller.unwrap_or(false) && o.uid != uid)
        .map(|o| format!("{} {}", o.kind, o.name))
}

fn ready_replicas(live: Option<&ChildObject>) -> i32 {
    match live {
        Some(ChildObject::Deployment(d)) => d
            .status
            .as_ref()
            .and_then(|s| s.ready_replicas)
            .unwrap_or(0),
        _ => 0,
    }
}

/// Replica count the workload should reach: the HPA floor when autoscaling,
/// otherwise the requested replicas.
pub fn desired_replicas(mc: &Memcached) -> i32 {
    let mut spec = mc.spec.clone();
    default_spec(&mut spec);
    match spec.autoscaling.as_ref().filter(|a| a.enabled) {
        Some(a) => a.min_replicas.unwrap_or(1),
        None => spec.replicas.unwrap_or(1),
    }
}

fn desired_status(mc: &Memcached, ready: i32) -> MemcachedStatus {
    let current = mc.status.clone().unwrap_or_default();
    let now = Utc::now().to_rfc3339();
    MemcachedStatus {
        conditions: upsert_conditions(
            &current.conditions,
            vec![available(ready, desired_replicas(mc)), reconciled()],
            &now,
        ),
        ready_replicas: ready,
        observed_generation: mc.metadata.generation,
    }
}
