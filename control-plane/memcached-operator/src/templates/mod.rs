//! Builders that turn a Memcached document into the child objects it owns.

pub mod deployment;
pub mod hpa;
pub mod network_policy;
pub mod pdb;
pub mod service;
pub mod service_monitor;

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
    LabelSelector, ObjectMeta, OwnerReference,
};
use kube::core::DynamicObject;
use kube::{Resource, ResourceExt};
use serde_json::Value;

use crate::admission::defaulter::default_spec;
use crate::crd::hub::{Memcached, MemcachedSpec};

pub const LABEL_NAME: &str = "app.kubernetes.io/name";
pub const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
pub const APP_NAME: &str = "memcached";
pub const MANAGER: &str = "memcached-operator";

pub const MEMCACHED_PORT: i32 = 11211;
pub const MEMCACHED_PORT_NAME: &str = "memcached";
pub const EXPORTER_PORT: i32 = 9150;
pub const EXPORTER_PORT_NAME: &str = "metrics";

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("object is missing metadata.{0}")]
    MissingMetadata(&'static str),
    #[error("cannot build {kind}: {reason}")]
    InvalidSpec { kind: ChildKind, reason: String },
    #[error("cannot encode child object: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Every kind of object a Memcached can own.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChildKind {
    Deployment,
    Service,
    PodDisruptionBudget,
    HorizontalPodAutoscaler,
    ServiceMonitor,
    NetworkPolicy,
}

impl ChildKind {
    pub const ALL: [ChildKind; 6] = [
        ChildKind::Deployment,
        ChildKind::Service,
        ChildKind::PodDisruptionBudget,
        ChildKind::HorizontalPodAutoscaler,
        ChildKind::ServiceMonitor,
        ChildKind::NetworkPolicy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChildKind::Deployment => "Deployment",
            ChildKind::Service => "Service",
            ChildKind::PodDisruptionBudget => "PodDisruptionBudget",
            ChildKind::HorizontalPodAutoscaler => "HorizontalPodAutoscaler",
            ChildKind::ServiceMonitor => "ServiceMonitor",
            ChildKind::NetworkPolicy => "NetworkPolicy",
        }
    }
}

impl fmt::Display for ChildKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A desired or live child object.
#[derive(Clone, Debug)]
pub enum ChildObject {
    Deployment(Deployment),
    Service(Service),
    PodDisruptionBudget(PodDisruptionBudget),
    HorizontalPodAutoscaler(HorizontalPodAutoscaler),
    ServiceMonitor(DynamicObject),
    NetworkPolicy(NetworkPolicy),
}

impl ChildObject {
    pub fn kind(&self) -> ChildKind {
        match self {
            ChildObject::Deployment(_) => ChildKind::Deployment,
            ChildObject::Service(_) => ChildKind::Service,
            ChildObject::PodDisruptionBudget(_) => {
                ChildKind::PodDisruptionBudget
            }
            ChildObject::HorizontalPodAutoscaler(_) => {
                ChildKind::HorizontalPodAutoscaler
            }
            ChildObject::ServiceMonitor(_) => ChildKind::ServiceMonitor,
            ChildObject::NetworkPolicy(_) => ChildKind::NetworkPolicy,
        }
    }

    pub fn meta(&self) -> &ObjectMeta {
        match self {
            ChildObject::Deployment(o) => o.meta(),
            ChildObject::Service(o) => o.meta(),
            ChildObject::PodDisruptionBudget(o) => o.meta(),
            ChildObject::HorizontalPodAutoscaler(o) => o.meta(),
            ChildObject::ServiceMonitor(o) => o.meta(),
            ChildObject::NetworkPolicy(o) => o.meta(),
        }
    }

    pub fn meta_mut(&mut self) -> &mut ObjectMeta {
        match self {
            ChildObject::Deployment(o) => o.meta_mut(),
            ChildObject::Service(o) => o.meta_mut(),
            ChildObject::PodDisruptionBudget(o) => o.meta_mut(),
            ChildObject::HorizontalPodAutoscaler(o) => o.meta_mut(),
            ChildObject::ServiceMonitor(o) => o.meta_mut(),
            ChildObject::NetworkPolicy(o) => o.meta_mut(),
        }
    }

    pub fn name(&self) -> String {
        self.meta().name.clone().unwrap_or_default()
    }

    /// True when `owner_uid` is the controlling owner of this object.
    pub fn is_controlled_by(&self, owner_uid: &str) -> bool {
        self.meta().owner_references.iter().flatten().any(|o| {
            o.uid == owner_uid && o.controller.unwrap_or(false)
        })
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        match self {
            ChildObject::Deployment(o) => serde_json::to_value(o),
            ChildObject::Service(o) => serde_json::to_value(o),
            ChildObject::PodDisruptionBudget(o) => serde_json::to_value(o),
            ChildObject::HorizontalPodAutoscaler(o) => serde_json::to_value(o),
            ChildObject::ServiceMonitor(o) => serde_json::to_value(o),
            ChildObject::NetworkPolicy(o) => serde_json::to_value(o),
        }
    }

    pub fn from_value(
        kind: ChildKind,
        value: Value,
    ) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            ChildKind::Deployment => {
                ChildObject::Deployment(serde_json::from_value(value)?)
            }
            ChildKind::Service => {
                ChildObject::Service(serde_json::from_value(value)?)
            }
            ChildKind::PodDisruptionBudget => {
                ChildObject::PodDisruptionBudget(serde_json::from_value(value)?)
            }
            ChildKind::HorizontalPodAutoscaler => {
                ChildObject::HorizontalPodAutoscaler(serde_json::from_value(
                    value,
                )?)
            }
            ChildKind::ServiceMonitor => {
                ChildObject::ServiceMonitor(serde_json::from_value(value)?)
            }
            ChildKind::NetworkPolicy => {
                ChildObject::NetworkPolicy(serde_json::from_value(value)?)
            }
        })
    }
}

/// Knobs that come from operator configuration rather than the document.
#[derive(Clone, Copy, Debug)]
pub struct RenderOptions {
    /// Manage ServiceMonitor objects (requires the Prometheus Operator CRDs)
    pub service_monitor: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            service_monitor: true,
        }
    }
}

impl RenderOptions {
    /// Kinds the engine creates and garbage collects.
    pub fn managed_kinds(&self) -> Vec<ChildKind> {
        ChildKind::ALL
            .into_iter()
            .filter(|k| {
                self.service_monitor || *k != ChildKind::ServiceMonitor
            })
            .collect()
    }
}

/// Identity shared by every child of one Memcached.
#[derive(Clone, Debug)]
pub struct RenderContext<'a> {
    pub name: &'a str,
    pub namespace: &'a str,
    pub spec: MemcachedSpec,
    pub owner_refs: Option<Vec<OwnerReference>>,
}

impl<'a> RenderContext<'a> {
    /// `spec` is defaulted again so objects written without the webhook
    /// still render completely.
    pub fn new(mc: &'a Memcached) -> Result<Self, BuildError> {
        let name = mc
            .metadata
            .name
            .as_deref()
            .ok_or(BuildError::MissingMetadata("name"))?;
        let namespace = mc
            .metadata
            .namespace
            .as_deref()
            .ok_or(BuildError::MissingMetadata("namespace"))?;
        let mut spec = mc.spec.clone();
        default_spec(&mut spec);
        Ok(Self {
            name,
            namespace,
            spec,
            owner_refs: owner_ref(mc),
        })
    }

    pub fn labels(&self) -> BTreeMap<String, String> {
        labels(self.name)
    }

    pub fn selector(&self) -> LabelSelector {
        LabelSelector {
            match_labels: Some(self.labels()),
            ..Default::default()
        }
    }

    pub fn metadata(&self) -> ObjectMeta {
        ObjectMeta {
            name: Some(self.name.to_string()),
            namespace: Some(self.namespace.to_string()),
            labels: Some(self.labels()),
            owner_references: self.owner_refs.clone(),
            ..Default::default()
        }
    }
}

pub fn labels(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_NAME.to_string(), APP_NAME.to_string()),
        (LABEL_INSTANCE.to_string(), name.to_string()),
        (LABEL_MANAGED_BY.to_string(), MANAGER.to_string()),
    ])
}

/// Label selector matching every object this operator manages.
pub fn managed_by_selector() -> String {
    format!("{LABEL_NAME}={APP_NAME},{LABEL_MANAGED_BY}={MANAGER}")
}

/// Recover the owning Memcached name from a child's labels.
pub fn owner_name(meta: &ObjectMeta) -> Option<&str> {
    let labels = meta.labels.as_ref()?;
    if labels.get(LABEL_MANAGED_BY).map(String::as_str) != Some(MANAGER) {
        return None;
    }
    labels.get(LABEL_INSTANCE).map(String::as_str)
}

/// Controller reference that holds the owner back during foreground deletion.
fn owner_ref(mc: &Memcached) -> Option<Vec<OwnerReference>> {
    let mut owner = mc.controller_owner_ref(&())?;
    owner.block_owner_deletion = Some(true);
    Some(vec![owner])
}

/// Build every child whose owning feature is present and enabled, in a
/// stable order.
pub fn render_all(
    mc: &Memcached,
    opts: &RenderOptions,
) -> Result<Vec<ChildObject>, BuildError> {
    let ctx = RenderContext::new(mc)?;
    let mut out = vec![
        ChildObject::Deployment(deployment::build(&ctx)?),
        ChildObject::Service(service::build(&ctx)),
    ];
    if let Some(pdb) = pdb::build(&ctx) {
        out.push(ChildObject::PodDisruptionBudget(pdb));
    }
    if let Some(hpa) = hpa::build(&ctx)? {
        out.push(ChildObject::HorizontalPodAutoscaler(hpa));
    }
    if opts.service_monitor {
        if let Some(sm) = service_monitor::build(&ctx) {
            out.push(ChildObject::ServiceMonitor(sm));
        }
    }
    if let Some(np) = network_policy::build(&ctx) {
        out.push(ChildObject::NetworkPolicy(np));
    }
    tracing::trace!(
        ns = %ctx.namespace,
        name = %mc.name_any(),
        count = out.len(),
        "render_all"
    );
    Ok(out)
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    use crate::crd::hub::{Memcached, MemcachedSpec};

    pub fn memcached(spec: MemcachedSpec) -> Memcached {
        let mut mc = Memcached::new("cache", spec);
        mc.metadata.namespace = Some("prod".into());
        mc.metadata.uid = Some("uid-1".into());
        mc.metadata.generation = Some(1);
        mc
    }
}
