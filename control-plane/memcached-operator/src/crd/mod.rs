pub mod condition;
pub mod registry;
pub mod v1alpha1;
pub mod v1beta1;

pub use condition::{Condition, ConditionStatus, ConditionType};
pub use registry::{Registry, SchemaVersion};

/// API group shared by every served revision.
pub const GROUP: &str = "cache.oaas.io";
pub const KIND: &str = "Memcached";

/// The hub revision. Everything persisted and reconciled is expressed in it.
pub use v1beta1 as hub;
