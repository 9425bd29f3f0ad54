//! `v1alpha1` <-> hub field mappings.
//!
//! Optional groups map `Some` to `Some` and `None` to `None`; a missing group
//! must never come back as an empty one.

use super::Convertible;
use crate::crd::{hub, v1alpha1 as alpha};

impl Convertible for alpha::Memcached {
    fn to_hub(&self) -> hub::Memcached {
        hub::Memcached {
            metadata: self.metadata.clone(),
            spec: self.spec.clone().into(),
            status: self.status.clone().map(Into::into),
        }
    }

    fn from_hub(hub: &hub::Memcached) -> Self {
        alpha::Memcached {
            metadata: hub.metadata.clone(),
            spec: hub.spec.clone().into(),
            status: hub.status.clone().map(Into::into),
        }
    }
}

impl From<alpha::MemcachedSpec> for hub::MemcachedSpec {
    fn from(s: alpha::MemcachedSpec) -> Self {
        hub::MemcachedSpec {
            replicas: s.replicas,
            image: s.image,
            resources: s.resources,
            memcached: s.memcached.map(Into::into),
            high_availability: s.high_availability.map(Into::into),
            monitoring: s.monitoring.map(Into::into),
            security: s.security.map(Into::into),
            autoscaling: s.autoscaling.map(Into::into),
            service: s.service.map(Into::into),
        }
    }
}

impl From<hub::MemcachedSpec> for alpha::MemcachedSpec {
    fn from(s: hub::MemcachedSpec) -> Self {
        alpha::MemcachedSpec {
            replicas: s.replicas,
            image: s.image,
            resources: s.resources,
            memcached: s.memcached.map(Into::into),
            high_availability: s.high_availability.map(Into::into),
            monitoring: s.monitoring.map(Into::into),
            security: s.security.map(Into::into),
            autoscaling: s.autoscaling.map(Into::into),
            service: s.service.map(Into::into),
        }
    }
}

impl From<alpha::MemcachedConfig> for hub::MemcachedConfig {
    fn from(c: alpha::MemcachedConfig) -> Self {
        hub::MemcachedConfig {
            max_memory_mb: c.max_memory_mb,
            max_connections: c.max_connections,
            threads: c.threads,
            max_item_size: c.max_item_size,
            verbosity: c.verbosity,
            extra_args: c.extra_args,
        }
    }
}

impl From<hub::MemcachedConfig> for alpha::MemcachedConfig {
    fn from(c: hub::MemcachedConfig) -> Self {
        alpha::MemcachedConfig {
            max_memory_mb: c.max_memory_mb,
            max_connections: c.max_connections,
            threads: c.threads,
            max_item_size: c.max_item_size,
            verbosity: c.verbosity,
            extra_args: c.extra_args,
        }
    }
}

impl From<alpha::HighAvailabilitySpec> for hub::HighAvailabilitySpec {
    fn from(h: alpha::HighAvailabilitySpec) -> Self {
        hub::HighAvailabilitySpec {
            anti_affinity_preset: h.anti_affinity_preset.map(Into::into),
            topology_spread_constraints: h.topology_spread_constraints,
            pod_disruption_budget: h.pod_disruption_budget.map(|p| {
                hub::PdbSpec {
                    enabled: p.enabled,
                    min_available: p.min_available,
                    max_unavailable: p.max_unavailable,
                }
            }),
            graceful_shutdown: h.graceful_shutdown.map(|g| {
                hub::GracefulShutdownSpec {
                    enabled: g.enabled,
                    pre_stop_delay_seconds: g.pre_stop_delay_seconds,
                    termination_grace_period_seconds: g
                        .termination_grace_period_seconds,
                }
            }),
        }
    }
}

impl From<hub::HighAvailabilitySpec> for alpha::HighAvailabilitySpec {
    fn from(h: hub::HighAvailabilitySpec) -> Self {
        alpha::HighAvailabilitySpec {
            anti_affinity_preset: h.anti_affinity_preset.map(Into::into),
            topology_spread_constraints: h.topology_spread_constraints,
            pod_disruption_budget: h.pod_disruption_budget.map(|p| {
                alpha::PdbSpec {
                    enabled: p.enabled,
                    min_available: p.min_available,
                    max_unavailable: p.max_unavailable,
                }
            }),
            graceful_shutdown: h.graceful_shutdown.map(|g| {
                alpha::GracefulShutdownSpec {
                    enabled: g.enabled,
                    pre_stop_delay_seconds: g.pre_stop_delay_seconds,
                    termination_grace_period_seconds: g
                        .termination_grace_period_seconds,
                }
            }),
        }
    }
}

impl From<alpha::AntiAffinityPreset> for hub::AntiAffinityPreset {
    fn from(p: alpha::AntiAffinityPreset) -> Self {
        match p {
            alpha::AntiAffinityPreset::Soft => hub::AntiAffinityPreset::Soft,
            alpha::AntiAffinityPreset::Hard => hub::AntiAffinityPreset::Hard,
        }
    }
}

impl From<hub::AntiAffinityPreset> for alpha::AntiAffinityPreset {
    fn from(p: hub::AntiAffinityPreset) -> Self {
        match p {
            hub::AntiAffinityPreset::Soft => alpha::AntiAffinityPreset::Soft,
            hub::AntiAffinityPreset::Hard => alpha::AntiAffinityPreset::Hard,
        }
    }
}

impl From<alpha::MonitoringSpec> for hub::MonitoringSpec {
    fn from(m: alpha::MonitoringSpec) -> Self {
        hub::MonitoringSpec {
            enabled: m.enabled,
            exporter_image: m.exporter_image,
            exporter_resources: m.exporter_resources,
            service_monitor: m.service_monitor.map(|sm| {
                hub::ServiceMonitorSpec {
                    additional_labels: sm.additional_labels,
                    interval: sm.interval,
                    scrape_timeout: sm.scrape_timeout,
                }
            }),
        }
    }
}

impl From<hub::MonitoringSpec> for alpha::MonitoringSpec {
    fn from(m: hub::MonitoringSpec) -> Self {
        alpha::MonitoringSpec {
            enabled: m.enabled,
            exporter_image: m.exporter_image,
            exporter_resources: m.exporter_resources,
            service_monitor: m.service_monitor.map(|sm| {
                alpha::ServiceMonitorSpec {
                    additional_labels: sm.additional_labels,
                    interval: sm.interval,
                    scrape_timeout: sm.scrape_timeout,
                }
            }),
        }
    }
}

impl From<alpha::SecuritySpec> for hub::SecuritySpec {
    fn from(s: alpha::SecuritySpec) -> Self {
        hub::SecuritySpec {
            pod_security_context: s.pod_security_context,
            container_security_context: s.container_security_context,
            sasl: s.sasl.map(|sasl| hub::SaslSpec {
                enabled: sasl.enabled,
                credentials_secret_ref: hub::SecretReference {
                    name: sasl.credentials_secret_name,
                },
            }),
            tls: s.tls.map(|tls| hub::TlsSpec {
                enabled: tls.enabled,
                certificate_secret_ref: hub::SecretReference {
                    name: tls.certificate_secret_name,
                },
                enable_client_cert: tls.enable_client_cert,
            }),
            network_policy: s.network_policy.map(|np| {
                hub::NetworkPolicySpec {
                    enabled: np.enabled,
                    allowed_sources: np.allowed_sources,
                }
            }),
        }
    }
}

impl From<hub::SecuritySpec> for alpha::SecuritySpec {
    fn from(s: hub::SecuritySpec) -> Self {
        alpha::SecuritySpec {
            pod_security_context: s.pod_security_context,
            container_security_context: s.container_security_context,
            sasl: s.sasl.map(|sasl| alpha::SaslSpec {
                enabled: sasl.enabled,
                credentials_secret_name: sasl.credentials_secret_ref.name,
            }),
            tls: s.tls.map(|tls| alpha::TlsSpec {
                enabled: tls.enabled,
                certificate_secret_name: tls.certificate_secret_ref.name,
                enable_client_cert: tls.enable_client_cert,
            }),
            network_policy: s.network_policy.map(|np| {
                alpha::NetworkPolicySpec {
                    enabled: np.enabled,
                    allowed_sources: np.allowed_sources,
                }
            }),
        }
    }
}

impl From<alpha::AutoscalingSpec> for hub::AutoscalingSpec {
    fn from(a: alpha::AutoscalingSpec) -> Self {
        hub::AutoscalingSpec {
            enabled: a.enabled,
            min_replicas: a.min_replicas,
            max_replicas: a.max_replicas,
            metrics: a.metrics,
            behavior: a.behavior,
        }
    }
}

impl From<hub::AutoscalingSpec> for alpha::AutoscalingSpec {
    fn from(a: hub::AutoscalingSpec) -> Self {
        alpha::AutoscalingSpec {
            enabled: a.enabled,
            min_replicas: a.min_replicas,
            max_replicas: a.max_replicas,
            metrics: a.metrics,
            behavior: a.behavior,
        }
    }
}

impl From<alpha::ServiceConfig> for hub::ServiceConfig {
    fn from(s: alpha::ServiceConfig) -> Self {
        hub::ServiceConfig {
            annotations: s.annotations,
        }
    }
}

impl From<hub::ServiceConfig> for alpha::ServiceConfig {
    fn from(s: hub::ServiceConfig) -> Self {
        alpha::ServiceConfig {
            annotations: s.annotations,
        }
    }
}

impl From<alpha::MemcachedStatus> for hub::MemcachedStatus {
    fn from(s: alpha::MemcachedStatus) -> Self {
        hub::MemcachedStatus {
            conditions: s.conditions,
            ready_replicas: s.ready_replicas,
            observed_generation: s.observed_generation,
        }
    }
}

impl From<hub::MemcachedStatus> for alpha::MemcachedStatus {
    fn from(s: hub::MemcachedStatus) -> Self {
        alpha::MemcachedStatus {
            conditions: s.conditions,
            ready_replicas: s.ready_replicas,
            observed_generation: s.observed_generation,
        }
    }
}
