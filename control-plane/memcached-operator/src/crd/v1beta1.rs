//! `cache.oaas.io/v1beta1`: the hub revision of the Memcached resource.
//!
//! Every configuration group is an `Option`. `None` means the user never asked
//! for the feature; `Some(Default::default())` means the group is present with
//! zero values and is eligible for defaulting. The two must never be conflated.

use std::collections::BTreeMap;

use k8s_openapi::api::autoscaling::v2::{
    HorizontalPodAutoscalerBehavior, MetricSpec,
};
use k8s_openapi::api::core::v1::{
    PodSecurityContext, ResourceRequirements, SecurityContext,
    TopologySpreadConstraint,
};
use k8s_openapi::api::networking::v1::NetworkPolicyPeer;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::condition::Condition;

#[derive(
    CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq,
    JsonSchema,
)]
#[kube(
    group = "cache.oaas.io",
    version = "v1beta1",
    kind = "Memcached",
    plural = "memcacheds",
    shortname = "mc",
    namespaced,
    status = "MemcachedStatus",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Replicas","type":"integer","jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Ready","type":"integer","jsonPath":".status.readyReplicas"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MemcachedSpec {
    /// Number of memcached pods. Must stay unset when autoscaling is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 0))]
    pub replicas: Option<i32>,
    /// Container image for memcached (default `memcached:1.6`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Resource requests/limits of the memcached container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    /// Cache tuning; always materialized by the defaulter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memcached: Option<MemcachedConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high_availability: Option<HighAvailabilitySpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitoring: Option<MonitoringSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<SecuritySpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoscaling: Option<AutoscalingSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<ServiceConfig>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MemcachedConfig {
    /// Memory ceiling for item storage in MB (`-m`)
    #[serde(rename = "maxMemoryMB", default)]
    #[schemars(range(min = 16, max = 65536))]
    pub max_memory_mb: i32,
    /// Maximum simultaneous connections (`-c`)
    #[serde(default)]
    #[schemars(range(min = 1, max = 65536))]
    pub max_connections: i32,
    /// Worker threads (`-t`)
    #[serde(default)]
    #[schemars(range(min = 1, max = 128))]
    pub threads: i32,
    /// Maximum item size, e.g. `1m` or `512k` (`-I`)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    #[schemars(regex(pattern = r"^[0-9]+(k|m)$"))]
    pub max_item_size: String,
    /// 0 = quiet, 1 = `-v`, 2 = `-vv`
    #[serde(default)]
    #[schemars(range(min = 0, max = 2))]
    pub verbosity: i32,
    /// Extra command line arguments appended verbatim
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HighAvailabilitySpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anti_affinity_preset: Option<AntiAffinityPreset>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topology_spread_constraints: Vec<TopologySpreadConstraint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_disruption_budget: Option<PdbSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graceful_shutdown: Option<GracefulShutdownSpec>,
}

#[derive(
    Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum AntiAffinityPreset {
    /// Preferred scheduling away from peers on the same node
    Soft,
    /// Required scheduling away from peers on the same node
    Hard,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PdbSpec {
    #[serde(default)]
    pub enabled: bool,
    /// Mutually exclusive with `maxUnavailable`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_available: Option<IntOrString>,
    /// Mutually exclusive with `minAvailable`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_unavailable: Option<IntOrString>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GracefulShutdownSpec {
    #[serde(default)]
    pub enabled: bool,
    /// Seconds the preStop hook sleeps so endpoints drain first
    #[serde(default)]
    #[schemars(range(min = 0))]
    pub pre_stop_delay_seconds: i32,
    /// Must be greater than `preStopDelaySeconds`
    #[serde(default)]
    #[schemars(range(min = 0))]
    pub termination_grace_period_seconds: i64,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringSpec {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exporter_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exporter_resources: Option<ResourceRequirements>,
    /// Presence (together with `enabled`) creates a ServiceMonitor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_monitor: Option<ServiceMonitorSpec>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMonitorSpec {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional_labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scrape_timeout: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecuritySpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_security_context: Option<PodSecurityContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_security_context: Option<SecurityContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sasl: Option<SaslSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_policy: Option<NetworkPolicySpec>,
}

/// Reference to a Secret in the resource's namespace.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct SecretReference {
    #[serde(default)]
    pub name: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SaslSpec {
    #[serde(default)]
    pub enabled: bool,
    /// Secret holding the `password-file` key
    #[serde(default)]
    pub credentials_secret_ref: SecretReference,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TlsSpec {
    #[serde(default)]
    pub enabled: bool,
    /// Secret holding `tls.crt`, `tls.key` and optionally `ca.crt`
    #[serde(default)]
    pub certificate_secret_ref: SecretReference,
    /// Require and verify client certificates against `ca.crt`
    #[serde(default)]
    pub enable_client_cert: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPolicySpec {
    #[serde(default)]
    pub enabled: bool,
    /// Peers allowed to reach memcached; empty allows every source
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_sources: Vec<NetworkPolicyPeer>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AutoscalingSpec {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 1))]
    pub min_replicas: Option<i32>,
    #[serde(default)]
    pub max_replicas: i32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metrics: Vec<MetricSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub behavior: Option<HorizontalPodAutoscalerBehavior>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    /// Extra annotations for the generated headless Service
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MemcachedStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub ready_replicas: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl MemcachedSpec {
    pub fn autoscaling_enabled(&self) -> bool {
        self.autoscaling.as_ref().map(|a| a.enabled).unwrap_or(false)
    }

    /// The PDB settings when a budget should exist.
    pub fn enabled_pdb(&self) -> Option<&PdbSpec> {
        self.high_availability
            .as_ref()
            .and_then(|ha| ha.pod_disruption_budget.as_ref())
            .filter(|p| p.enabled)
    }

    pub fn enabled_graceful_shutdown(&self) -> Option<&GracefulShutdownSpec> {
        self.high_availability
            .as_ref()
            .and_then(|ha| ha.graceful_shutdown.as_ref())
            .filter(|g| g.enabled)
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().map(|m| m.enabled).unwrap_or(false)
    }

    /// The scrape settings when a ServiceMonitor should exist.
    pub fn enabled_service_monitor(&self) -> Option<&ServiceMonitorSpec> {
        self.monitoring
            .as_ref()
            .filter(|m| m.enabled)
            .and_then(|m| m.service_monitor.as_ref())
    }

    pub fn enabled_sasl(&self) -> Option<&SaslSpec> {
        self.security
            .as_ref()
            .and_then(|s| s.sasl.as_ref())
            .filter(|s| s.enabled)
    }

    pub fn enabled_tls(&self) -> Option<&TlsSpec> {
        self.security
            .as_ref()
            .and_then(|s| s.tls.as_ref())
            .filter(|t| t.enabled)
    }

    pub fn enabled_network_policy(&self) -> Option<&NetworkPolicySpec> {
        self.security
            .as_ref()
            .and_then(|s| s.network_policy.as_ref())
            .filter(|n| n.enabled)
    }
}
