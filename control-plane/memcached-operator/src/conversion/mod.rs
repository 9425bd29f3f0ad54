//! Hub-and-spoke conversion between served revisions.
//!
//! `v1beta1` is the hub. Spokes implement [`Convertible`]; converting between
//! two spokes always goes through the hub. Conversions are total and never
//! validate: validation only runs at the admission boundary of whichever
//! revision received the write.

mod v1alpha1;

use serde_json::Value;
use tracing::trace;

use crate::crd::{Registry, SchemaVersion, hub, v1alpha1 as alpha};

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("type mismatch: expected kind {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("unknown apiVersion: {0}")]
    UnknownVersion(String),

    #[error("object is missing {0}")]
    MissingField(&'static str),

    #[error("malformed object: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// A revision that can be converted to and from the hub.
pub trait Convertible: Sized {
    fn to_hub(&self) -> hub::Memcached;
    fn from_hub(hub: &hub::Memcached) -> Self;
}

impl Convertible for hub::Memcached {
    fn to_hub(&self) -> hub::Memcached {
        self.clone()
    }

    fn from_hub(hub: &hub::Memcached) -> Self {
        hub.clone()
    }
}

/// Convert a raw object (as received in a ConversionReview) to
/// `desired_api_version`.
pub fn convert_object(
    registry: &Registry,
    object: Value,
    desired_api_version: &str,
) -> Result<Value, ConversionError> {
    let api_version = object
        .get("apiVersion")
        .and_then(Value::as_str)
        .ok_or(ConversionError::MissingField("apiVersion"))?;
    let kind = object
        .get("kind")
        .and_then(Value::as_str)
        .ok_or(ConversionError::MissingField("kind"))?;
    let source = registry.resolve(api_version, kind)?;
    let target = registry.resolve_target(desired_api_version)?;
    trace!(?source, ?target, "convert_object");
    if source == target {
        return Ok(object);
    }

    let hub_obj = match source {
        SchemaVersion::V1Alpha1 => {
            serde_json::from_value::<alpha::Memcached>(object)?.to_hub()
        }
        SchemaVersion::V1Beta1 => {
            serde_json::from_value::<hub::Memcached>(object)?
        }
    };
    let converted = match target {
        SchemaVersion::V1Alpha1 => {
            serde_json::to_value(alpha::Memcached::from_hub(&hub_obj))?
        }
        SchemaVersion::V1Beta1 => serde_json::to_value(hub_obj)?,
    };
    Ok(converted)
}
