//! Access to the cluster objects the engine reads and writes.

pub mod cluster;
pub mod memory;

use std::fmt;

use async_trait::async_trait;
use kube::ResourceExt;

use crate::crd::hub::{Memcached, MemcachedStatus};
use crate::templates::{ChildKind, ChildObject};

pub use cluster::KubeStore;
pub use memory::{MemoryStore, WriteCounts};

pub type StoreResult<T> = Result<T, StoreError>;

/// `namespace/name` of a namespaced object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn of<K: ResourceExt>(obj: &K) -> Option<Self> {
        Some(Self::new(obj.namespace()?, obj.name_any()))
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("api error {code}: {message}")]
    Api { code: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Conflict(_)
            | StoreError::Transport(_)
            | StoreError::Timeout(_) => true,
            StoreError::Api { code, .. } => *code == 429 || *code >= 500,
            StoreError::NotFound(_)
            | StoreError::AlreadyExists(_)
            | StoreError::Serialization(_) => false,
        }
    }
}

impl From<kube::Error> for StoreError {
    fn from(e: kube::Error) -> Self {
        match e {
            kube::Error::Api(resp) => match resp.code {
                404 => StoreError::NotFound(resp.message),
                409 if resp.reason == "AlreadyExists" => {
                    StoreError::AlreadyExists(resp.message)
                }
                409 => StoreError::Conflict(resp.message),
                code => StoreError::Api {
                    code,
                    message: resp.message,
                },
            },
            kube::Error::SerdeError(e) => StoreError::Serialization(e),
            other => StoreError::Transport(other.to_string()),
        }
    }
}

/// Everything the reconcile engine needs from the cluster. Writes carry the
/// resourceVersion they were based on so stale writes surface as
/// [`StoreError::Conflict`].
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_memcached(
        &self,
        key: &ObjectKey,
    ) -> StoreResult<Option<Memcached>>;

    async fn patch_status(
        &self,
        key: &ObjectKey,
        resource_version: Option<&str>,
        status: &MemcachedStatus,
    ) -> StoreResult<()>;

    async fn get_child(
        &self,
        kind: ChildKind,
        key: &ObjectKey,
    ) -> StoreResult<Option<ChildObject>>;

    async fn create_child(&self, child: &ChildObject) -> StoreResult<()>;

    /// Server-side apply of `child`; its metadata carries the live
    /// resourceVersion.
    async fn update_child(&self, child: &ChildObject) -> StoreResult<()>;

    async fn delete_child(
        &self,
        kind: ChildKind,
        key: &ObjectKey,
    ) -> StoreResult<()>;
}
