#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use kube::{
    Api, Client,
    api::{DeleteParams, PostParams},
};
use memcached_operator::controller::ReconcileContext;
use memcached_operator::crd::hub::{Memcached, MemcachedSpec};
use memcached_operator::store::{MemoryStore, ObjectKey};
use memcached_operator::templates::RenderOptions;

pub const NS: &str = "prod";
pub const NAME: &str = "cache";

pub fn key() -> ObjectKey {
    ObjectKey::new(NS, NAME)
}

/// DNS-1123 safe unique name for objects created in a live cluster.
pub fn uniq(prefix: &str) -> String {
    let nanos = chrono::Utc::now().timestamp_subsec_nanos();
    format!("{prefix}-{:06}", nanos % 1_000_000)
}

pub fn memcached(spec: MemcachedSpec) -> Memcached {
    let mut mc = Memcached::new(NAME, spec);
    mc.metadata.namespace = Some(NS.into());
    mc
}

/// In-memory store seeded with one document and an engine context over it.
pub async fn seeded(spec: MemcachedSpec) -> (MemoryStore, ReconcileContext) {
    seeded_with(spec, RenderOptions::default()).await
}

pub async fn seeded_with(
    spec: MemcachedSpec,
    render: RenderOptions,
) -> (MemoryStore, ReconcileContext) {
    let store = MemoryStore::new();
    store.put_memcached(memcached(spec)).await;
    let ctx = ReconcileContext::new(Arc::new(store.clone()), render);
    (store, ctx)
}

/// Deletes the Memcached on drop; owner references take the children.
pub struct MemcachedGuard {
    api: Api<Memcached>,
    name: String,
}

impl MemcachedGuard {
    pub async fn create(client: Client, ns: &str, mc: &Memcached) -> Self {
        let api: Api<Memcached> = Api::namespaced(client, ns);
        api.create(&PostParams::default(), mc)
            .await
            .expect("create memcached");
        Self {
            api,
            name: mc.metadata.name.clone().unwrap_or_default(),
        }
    }
}

impl Drop for MemcachedGuard {
    fn drop(&mut self) {
        let api = self.api.clone();
        let name = self.name.clone();
        tokio::spawn(async move {
            let _ = api.delete(&name, &DeleteParams::background()).await;
        });
    }
}

/// Poll `check` once a second until it returns `Some` or 60s pass.
pub async fn wait_for<T, F, Fut>(what: &str, mut check: F) -> T
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Option<T>>,
{
    for _ in 0..60 {
        if let Some(v) = check().await {
            return v;
        }
        tokio::time::sleep(Duration::from_millis(1000)).await;
    }
    panic!("{what} not observed in time");
}
