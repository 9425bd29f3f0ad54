use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use kube::api::{Api, DeleteParams, Patch, PatchParams};
use kube::core::DynamicObject;
use kube::{Client, Resource};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, trace};

use super::{ObjectKey, ObjectStore, StoreError, StoreResult};
use crate::crd::hub::{Memcached, MemcachedStatus};
use crate::templates::{ChildKind, ChildObject, service_monitor};

/// [`ObjectStore`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    field_manager: String,
}

impl KubeStore {
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    fn api<K>(&self, ns: &str) -> Api<K>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), ns)
    }

    fn service_monitors(&self, ns: &str) -> Api<DynamicObject> {
        Api::namespaced_with(
            self.client.clone(),
            ns,
            &service_monitor::api_resource(),
        )
    }

    /// Creates and updates are both a forced server-side apply under one
    /// field manager.
    async fn apply_child(&self, child: &ChildObject) -> StoreResult<()> {
        let ns = namespace_of(child)?;
        let name = child.name();
        let pp = apply_params(&self.field_manager);
        match child {
            ChildObject::Deployment(o) => {
                apply(self.api(&ns), &name, &pp, o).await
            }
            ChildObject::Service(o) => apply(self.api(&ns), &name, &pp, o).await,
            ChildObject::PodDisruptionBudget(o) => {
                apply(self.api(&ns), &name, &pp, o).await
            }
            ChildObject::HorizontalPodAutoscaler(o) => {
                apply(self.api(&ns), &name, &pp, o).await
            }
            ChildObject::ServiceMonitor(o) => {
                apply(self.service_monitors(&ns), &name, &pp, o).await
            }
            ChildObject::NetworkPolicy(o) => {
                apply(self.api(&ns), &name, &pp, o).await
            }
        }
    }
}

fn apply_params(field_manager: &str) -> PatchParams {
    PatchParams::apply(field_manager).force()
}

async fn get_opt<K>(api: Api<K>, name: &str) -> StoreResult<Option<K>>
where
    K: Clone + DeserializeOwned + Debug,
{
    Ok(api.get_opt(name).await?)
}

async fn apply<K>(
    api: Api<K>,
    name: &str,
    pp: &PatchParams,
    obj: &K,
) -> StoreResult<()>
where
    K: Clone + DeserializeOwned + Serialize + Debug,
{
    api.patch(name, pp, &Patch::Apply(obj)).await?;
    Ok(())
}

async fn delete<K>(api: Api<K>, name: &str) -> StoreResult<()>
where
    K: Clone + DeserializeOwned + Debug,
{
    match api.delete(name, &DeleteParams::background()).await {
        Ok(_) => Ok(()),
        Err(e) => match StoreError::from(e) {
            StoreError::NotFound(_) => Ok(()),
            other => Err(other),
        },
    }
}

fn namespace_of(child: &ChildObject) -> StoreResult<String> {
    child.meta().namespace.clone().ok_or_else(|| {
        StoreError::Api {
            code: 422,
            message: format!("{} {} has no namespace", child.kind(), child.name()),
        }
    })
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get_memcached(
        &self,
        key: &ObjectKey,
    ) -> StoreResult<Option<Memcached>> {
        get_opt(self.api::<Memcached>(&key.namespace), &key.name).await
    }

    async fn patch_status(
        &self,
        key: &ObjectKey,
        resource_version: Option<&str>,
        status: &MemcachedStatus,
    ) -> StoreResult<()> {
        let api = self.api::<Memcached>(&key.namespace);
        let mut patch = json!({ "status": status });
        if let Some(rv) = resource_version {
            patch["metadata"] = json!({ "resourceVersion": rv });
        }
        trace!(%key, "patch_status");
        api.patch_status(&key.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn get_child(
        &self,
        kind: ChildKind,
        key: &ObjectKey,
    ) -> StoreResult<Option<ChildObject>> {
        let ns = &key.namespace;
        let name = &key.name;
        Ok(match kind {
            ChildKind::Deployment => get_opt(self.api::<Deployment>(ns), name)
                .await?
                .map(ChildObject::Deployment),
            ChildKind::Service => get_opt(self.api::<Service>(ns), name)
                .await?
                .map(ChildObject::Service),
            ChildKind::PodDisruptionBudget => {
                get_opt(self.api::<PodDisruptionBudget>(ns), name)
                    .await?
                    .map(ChildObject::PodDisruptionBudget)
            }
            ChildKind::HorizontalPodAutoscaler => {
                get_opt(self.api::<HorizontalPodAutoscaler>(ns), name)
                    .await?
                    .map(ChildObject::HorizontalPodAutoscaler)
            }
            ChildKind::ServiceMonitor => {
                get_opt(self.service_monitors(ns), name)
                    .await?
                    .map(ChildObject::ServiceMonitor)
            }
            ChildKind::NetworkPolicy => {
                get_opt(self.api::<NetworkPolicy>(ns), name)
                    .await?
                    .map(ChildObject::NetworkPolicy)
            }
        })
    }

    async fn create_child(&self, child: &ChildObject) -> StoreResult<()> {
        debug!(kind = %child.kind(), name = %child.name(), "create_child");
        self.apply_child(child).await
    }

    async fn update_child(&self, child: &ChildObject) -> StoreResult<()> {
        debug!(kind = %child.kind(), name = %child.name(), "update_child");
        self.apply_child(child).await
    }

    async fn delete_child(
        &self,
        kind: ChildKind,
        key: &ObjectKey,
    ) -> StoreResult<()> {
        let ns = &key.namespace;
        let name = &key.name;
        debug!(%ns, %kind, %name, "delete_child");
        match kind {
            ChildKind::Deployment => {
                delete(self.api::<Deployment>(ns), name).await
            }
            ChildKind::Service => delete(self.api::<Service>(ns), name).await,
            ChildKind::PodDisruptionBudget => {
                delete(self.api::<PodDisruptionBudget>(ns), name).await
            }
            ChildKind::HorizontalPodAutoscaler => {
                delete(self.api::<HorizontalPodAutoscaler>(ns), name).await
            }
            ChildKind::ServiceMonitor => {
                delete(self.service_monitors(ns), name).await
            }
            ChildKind::NetworkPolicy => {
                delete(self.api::<NetworkPolicy>(ns), name).await
            }
        }
    }
}
