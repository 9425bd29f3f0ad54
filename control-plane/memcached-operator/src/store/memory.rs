use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{ObjectKey, ObjectStore, StoreError, StoreResult};
use crate::crd::hub::{Memcached, MemcachedStatus};
use crate::templates::{ChildKind, ChildObject};

/// Writes observed by a [`MemoryStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteCounts {
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
    pub status: usize,
}

impl WriteCounts {
    pub fn total(&self) -> usize {
        self.creates + self.updates + self.deletes + self.status
    }
}

#[derive(Default)]
struct State {
    memcacheds: BTreeMap<ObjectKey, Memcached>,
    children: BTreeMap<(ChildKind, ObjectKey), Value>,
    revision: u64,
    writes: WriteCounts,
    failures: VecDeque<StoreError>,
}

impl State {
    fn next_revision(&mut self) -> String {
        self.revision += 1;
        self.revision.to_string()
    }

    fn take_failure(&mut self) -> StoreResult<()> {
        match self.failures.pop_front() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// In-process [`ObjectStore`] with resourceVersion checks, used by tests and
/// local runs.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
}

fn child_key(child: &ChildObject) -> ObjectKey {
    let meta = child.meta();
    ObjectKey::new(
        meta.namespace.clone().unwrap_or_default(),
        meta.name.clone().unwrap_or_default(),
    )
}

fn resource_version(value: &Value) -> Option<&str> {
    value.pointer("/metadata/resourceVersion")?.as_str()
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a Memcached as the API server would after admission: uid,
    /// resourceVersion and generation are assigned.
    pub async fn put_memcached(&self, mut mc: Memcached) -> Memcached {
        let mut state = self.state.write().await;
        let key = ObjectKey::of(&mc).unwrap_or_else(|| {
            ObjectKey::new("default", mc.metadata.name.clone().unwrap_or_default())
        });
        let previous = state.memcacheds.get(&key).cloned();
        let generation = match &previous {
            Some(p) if p.spec == mc.spec => p.metadata.generation,
            Some(p) => p.metadata.generation.map(|g| g + 1),
            None => Some(1),
        };
        mc.metadata.namespace = Some(key.namespace.clone());
        mc.metadata.generation = generation;
        mc.metadata.uid = previous
            .as_ref()
            .and_then(|p| p.metadata.uid.clone())
            .or_else(|| Some(format!("uid-{}", key)));
        if mc.status.is_none() {
            mc.status = previous.and_then(|p| p.status);
        }
        mc.metadata.resource_version = Some(state.next_revision());
        state.memcacheds.insert(key, mc.clone());
        mc
    }

    pub async fn remove_memcached(&self, key: &ObjectKey) {
        self.state.write().await.memcacheds.remove(key);
    }

    pub async fn child(
        &self,
        kind: ChildKind,
        key: &ObjectKey,
    ) -> Option<ChildObject> {
        let state = self.state.read().await;
        let value = state.children.get(&(kind, key.clone()))?.clone();
        ChildObject::from_value(kind, value).ok()
    }

    pub async fn child_kinds(&self, key: &ObjectKey) -> Vec<ChildKind> {
        let state = self.state.read().await;
        state
            .children
            .keys()
            .filter(|(_, k)| k == key)
            .map(|(kind, _)| *kind)
            .collect()
    }

    /// Place an object directly, bypassing write counting (external actors).
    pub async fn insert_child(&self, child: &ChildObject) {
        let mut state = self.state.write().await;
        let mut value = match child.to_value() {
            Ok(v) => v,
            Err(_) => return,
        };
        value["metadata"]["resourceVersion"] =
            Value::String(state.next_revision());
        state.children.insert((child.kind(), child_key(child)), value);
    }

    /// Simulate the Deployment controller reporting ready pods.
    pub async fn set_ready_replicas(&self, key: &ObjectKey, ready: i32) {
        let mut state = self.state.write().await;
        let rv = state.next_revision();
        if let Some(dep) =
            state.children.get_mut(&(ChildKind::Deployment, key.clone()))
        {
            dep["status"]["readyReplicas"] = Value::from(ready);
            dep["metadata"]["resourceVersion"] = Value::String(rv);
        }
    }

    /// Fail the next write with `err`.
    pub async fn fail_next_write(&self, err: StoreError) {
        self.state.write().await.failures.push_back(err);
    }

    pub async fn writes(&self) -> WriteCounts {
        self.state.read().await.writes
    }

    pub async fn reset_writes(&self) {
        self.state.write().await.writes = WriteCounts::default();
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get_memcached(
        &self,
        key: &ObjectKey,
    ) -> StoreResult<Option<Memcached>> {
        Ok(self.state.read().await.memcacheds.get(key).cloned())
    }

    async fn patch_status(
        &self,
        key: &ObjectKey,
        resource_version: Option<&str>,
        status: &MemcachedStatus,
    ) -> StoreResult<()> {
        let mut state = self.state.write().await;
        state.take_failure()?;
        let current = state
            .memcacheds
            .get(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        if let Some(rv) = resource_version {
            if current.metadata.resource_version.as_deref() != Some(rv) {
                return Err(StoreError::Conflict(key.to_string()));
            }
        }
        let rv = state.next_revision();
        if let Some(mc) = state.memcacheds.get_mut(key) {
            mc.status = Some(status.clone());
            mc.metadata.resource_version = Some(rv);
        }
        state.writes.status += 1;
        Ok(())
    }

    async fn get_child(
        &self,
        kind: ChildKind,
        key: &ObjectKey,
    ) -> StoreResult<Option<ChildObject>> {
        let state = self.state.read().await;
        match state.children.get(&(kind, key.clone())) {
            Some(v) => Ok(Some(ChildObject::from_value(kind, v.clone())?)),
            None => Ok(None),
        }
    }

    async fn create_child(&self, child: &ChildObject) -> StoreResult<()> {
        let mut state = self.state.write().await;
        state.take_failure()?;
        let key = (child.kind(), child_key(child));
        if state.children.contains_key(&key) {
            return Err(StoreError::AlreadyExists(key.1.to_string()));
        }
        let mut value = child.to_value()?;
        value["metadata"]["resourceVersion"] =
            Value::String(state.next_revision());
        state.children.insert(key, value);
        state.writes.creates += 1;
        Ok(())
    }

    async fn update_child(&self, child: &ChildObject) -> StoreResult<()> {
        let mut state = self.state.write().await;
        state.take_failure()?;
        let key = (child.kind(), child_key(child));
        let live = state
            .children
            .get(&key)
            .ok_or_else(|| StoreError::NotFound(key.1.to_string()))?;
        let expected = child.meta().resource_version.as_deref();
        if expected.is_some() && expected != resource_version(live) {
            return Err(StoreError::Conflict(key.1.to_string()));
        }
        // fields the API server owns survive an apply
        let live_status = live.get("status").cloned();
        let mut value = child.to_value()?;
        if let Some(status) = live_status {
            value["status"] = status;
        }
        value["metadata"]["resourceVersion"] =
            Value::String(state.next_revision());
        state.children.insert(key, value);
        state.writes.updates += 1;
        Ok(())
    }

    async fn delete_child(
        &self,
        kind: ChildKind,
        key: &ObjectKey,
    ) -> StoreResult<()> {
        let mut state = self.state.write().await;
        state.take_failure()?;
        if state.children.remove(&(kind, key.clone())).is_some() {
            state.writes.deletes += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::hub::MemcachedSpec;
    use crate::templates::{RenderOptions, render_all};

    fn key() -> ObjectKey {
        ObjectKey::new("prod", "cache")
    }

    async fn seeded() -> (MemoryStore, Memcached) {
        let store = MemoryStore::new();
        let mut mc = Memcached::new("cache", MemcachedSpec::default());
        mc.metadata.namespace = Some("prod".into());
        let mc = store.put_memcached(mc).await;
        (store, mc)
    }

    #[tokio::test]
    async fn put_assigns_identity_and_bumps_generation_on_spec_change() {
        let (store, mc) = seeded().await;
        assert_eq!(mc.metadata.uid.as_deref(), Some("uid-prod/cache"));
        assert_eq!(mc.metadata.generation, Some(1));

        let again = store.put_memcached(mc.clone()).await;
        assert_eq!(again.metadata.generation, Some(1));

        let mut changed = mc.clone();
        changed.spec.replicas = Some(3);
        let changed = store.put_memcached(changed).await;
        assert_eq!(changed.metadata.generation, Some(2));
        assert_eq!(changed.metadata.uid, mc.metadata.uid);
    }

    #[tokio::test]
    async fn stale_child_update_conflicts() {
        let (store, mc) = seeded().await;
        let dep = render_all(&mc, &RenderOptions::default()).unwrap().remove(0);
        store.create_child(&dep).await.unwrap();
        assert!(matches!(
            store.create_child(&dep).await,
            Err(StoreError::AlreadyExists(_))
        ));

        let mut stale = dep.clone();
        stale.meta_mut().resource_version = Some("999".into());
        let err = store.update_child(&stale).await.unwrap_err();
        assert!(err.is_transient());

        let live = store
            .get_child(ChildKind::Deployment, &key())
            .await
            .unwrap()
            .unwrap();
        let mut fresh = dep.clone();
        fresh.meta_mut().resource_version = live.meta().resource_version.clone();
        store.update_child(&fresh).await.unwrap();
        assert_eq!(
            store.writes().await,
            WriteCounts {
                creates: 1,
                updates: 1,
                ..Default::default()
            }
        );
    }

    #[tokio::test]
    async fn update_keeps_live_status() {
        let (store, mc) = seeded().await;
        let dep = render_all(&mc, &RenderOptions::default()).unwrap().remove(0);
        store.create_child(&dep).await.unwrap();
        store.set_ready_replicas(&key(), 1).await;
        store.update_child(&dep).await.unwrap();
        let ChildObject::Deployment(live) =
            store.child(ChildKind::Deployment, &key()).await.unwrap()
        else {
            panic!("expected a deployment");
        };
        assert_eq!(live.status.unwrap().ready_replicas, Some(1));
    }

    #[tokio::test]
    async fn status_patch_checks_resource_version_and_injected_failures() {
        let (store, mc) = seeded().await;
        let status = MemcachedStatus::default();
        assert!(matches!(
            store.patch_status(&key(), Some("0"), &status).await,
            Err(StoreError::Conflict(_))
        ));
        store
            .patch_status(&key(), mc.metadata.resource_version.as_deref(), &status)
            .await
            .unwrap();

        store
            .fail_next_write(StoreError::Timeout("slow".into()))
            .await;
        assert!(matches!(
            store.patch_status(&key(), None, &status).await,
            Err(StoreError::Timeout(_))
        ));
        store.patch_status(&key(), None, &status).await.unwrap();
        assert_eq!(store.writes().await.status, 2);
    }

    #[tokio::test]
    async fn deleting_missing_child_is_not_a_write() {
        let (store, _) = seeded().await;
        store
            .delete_child(ChildKind::ServiceMonitor, &key())
            .await
            .unwrap();
        assert_eq!(store.writes().await.total(), 0);
    }
}
