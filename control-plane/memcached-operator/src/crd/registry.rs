use kube::Resource;

use super::{v1alpha1, v1beta1};
use crate::conversion::ConversionError;

/// Schema revisions served for the Memcached kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaVersion {
    V1Alpha1,
    V1Beta1,
}

#[derive(Debug, Clone)]
struct Entry {
    api_version: String,
    kind: String,
    version: SchemaVersion,
}

/// Maps `apiVersion`/`kind` pairs onto concrete Rust types.
///
/// Built once at startup and handed to whatever needs type resolution
/// (the conversion endpoint today).
#[derive(Debug, Clone)]
pub struct Registry {
    entries: Vec<Entry>,
    hub: SchemaVersion,
}

impl Registry {
    pub fn new() -> Self {
        let entries = vec![
            Entry {
                api_version: v1alpha1::Memcached::api_version(&()).into_owned(),
                kind: v1alpha1::Memcached::kind(&()).into_owned(),
                version: SchemaVersion::V1Alpha1,
            },
            Entry {
                api_version: v1beta1::Memcached::api_version(&()).into_owned(),
                kind: v1beta1::Memcached::kind(&()).into_owned(),
                version: SchemaVersion::V1Beta1,
            },
        ];
        Self {
            entries,
            hub: SchemaVersion::V1Beta1,
        }
    }

    pub fn hub(&self) -> SchemaVersion {
        self.hub
    }

    /// Resolve an object's `apiVersion`/`kind` to a registered revision.
    pub fn resolve(
        &self,
        api_version: &str,
        kind: &str,
    ) -> Result<SchemaVersion, ConversionError> {
        let known_kind = self.entries.iter().any(|e| e.kind == kind);
        if !known_kind {
            return Err(ConversionError::TypeMismatch {
                expected: super::KIND.to_string(),
                found: format!("{}/{}", api_version, kind),
            });
        }
        self.entries
            .iter()
            .find(|e| e.api_version == api_version && e.kind == kind)
            .map(|e| e.version)
            .ok_or_else(|| {
                ConversionError::UnknownVersion(api_version.to_string())
            })
    }

    /// Resolve a target `apiVersion` for the registered kind.
    pub fn resolve_target(
        &self,
        api_version: &str,
    ) -> Result<SchemaVersion, ConversionError> {
        self.entries
            .iter()
            .find(|e| e.api_version == api_version)
            .map(|e| e.version)
            .ok_or_else(|| {
                ConversionError::UnknownVersion(api_version.to_string())
            })
    }

    pub fn api_version_of(&self, version: SchemaVersion) -> &str {
        self.entries
            .iter()
            .find(|e| e.version == version)
            .map(|e| e.api_version.as_str())
            .unwrap_or_default()
    }

    pub fn served_api_versions(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.api_version.as_str())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
