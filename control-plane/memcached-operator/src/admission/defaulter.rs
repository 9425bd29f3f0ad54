use k8s_openapi::api::autoscaling::v2::{
    HPAScalingRules, HorizontalPodAutoscalerBehavior, MetricSpec,
    MetricTarget, ResourceMetricSource,
};

use crate::crd::hub::{AntiAffinityPreset, Memcached, MemcachedSpec};

pub const DEFAULT_IMAGE: &str = "memcached:1.6";
pub const DEFAULT_REPLICAS: i32 = 1;
pub const DEFAULT_MAX_MEMORY_MB: i32 = 64;
pub const DEFAULT_MAX_CONNECTIONS: i32 = 1024;
pub const DEFAULT_THREADS: i32 = 4;
pub const DEFAULT_MAX_ITEM_SIZE: &str = "1m";
pub const DEFAULT_EXPORTER_IMAGE: &str = "prom/memcached-exporter:v0.15.4";
pub const DEFAULT_PRE_STOP_DELAY_SECONDS: i32 = 10;
pub const DEFAULT_TERMINATION_GRACE_PERIOD_SECONDS: i64 = 30;
pub const DEFAULT_SCRAPE_INTERVAL: &str = "30s";
pub const DEFAULT_SCRAPE_TIMEOUT: &str = "10s";
pub const DEFAULT_MIN_REPLICAS: i32 = 1;
pub const DEFAULT_CPU_UTILIZATION: i32 = 80;
pub const DEFAULT_SCALE_DOWN_STABILIZATION_SECONDS: i32 = 300;

pub fn default_memcached(obj: &mut Memcached) {
    default_spec(&mut obj.spec);
}

/// Fill omitted fields. Never fails and is idempotent.
pub fn default_spec(spec: &mut MemcachedSpec) {
    if spec.image.as_deref().is_none_or(str::is_empty) {
        spec.image = Some(DEFAULT_IMAGE.to_string());
    }

    if spec.autoscaling_enabled() {
        // a `1` here is what a previous pass injected before autoscaling
        // was switched on
        if spec.replicas == Some(DEFAULT_REPLICAS) {
            spec.replicas = None;
        }
    } else if spec.replicas.is_none() {
        spec.replicas = Some(DEFAULT_REPLICAS);
    }

    let mc = spec.memcached.get_or_insert_with(Default::default);
    set_if_zero(&mut mc.max_memory_mb, DEFAULT_MAX_MEMORY_MB);
    set_if_zero(&mut mc.max_connections, DEFAULT_MAX_CONNECTIONS);
    set_if_zero(&mut mc.threads, DEFAULT_THREADS);
    if mc.max_item_size.is_empty() {
        mc.max_item_size = DEFAULT_MAX_ITEM_SIZE.to_string();
    }

    if let Some(ha) = spec.high_availability.as_mut() {
        ha.anti_affinity_preset.get_or_insert(AntiAffinityPreset::Soft);
        if let Some(gs) = ha.graceful_shutdown.as_mut() {
            set_if_zero(
                &mut gs.pre_stop_delay_seconds,
                DEFAULT_PRE_STOP_DELAY_SECONDS,
            );
            set_if_zero(
                &mut gs.termination_grace_period_seconds,
                DEFAULT_TERMINATION_GRACE_PERIOD_SECONDS,
            );
        }
    }

    if let Some(mon) = spec.monitoring.as_mut() {
        set_if_blank(&mut mon.exporter_image, DEFAULT_EXPORTER_IMAGE);
        if let Some(sm) = mon.service_monitor.as_mut() {
            set_if_blank(&mut sm.interval, DEFAULT_SCRAPE_INTERVAL);
            set_if_blank(&mut sm.scrape_timeout, DEFAULT_SCRAPE_TIMEOUT);
        }
    }

    if let Some(hpa) = spec.autoscaling.as_mut().filter(|a| a.enabled) {
        hpa.min_replicas.get_or_insert(DEFAULT_MIN_REPLICAS);
        if hpa.metrics.is_empty() {
            hpa.metrics.push(cpu_utilization_metric(DEFAULT_CPU_UTILIZATION));
        }
        let behavior = hpa
            .behavior
            .get_or_insert_with(HorizontalPodAutoscalerBehavior::default);
        if behavior.scale_down.is_none() {
            behavior.scale_down = Some(HPAScalingRules {
                stabilization_window_seconds: Some(
                    DEFAULT_SCALE_DOWN_STABILIZATION_SECONDS,
                ),
                ..Default::default()
            });
        }
    }
}

pub fn cpu_utilization_metric(percent: i32) -> MetricSpec {
    MetricSpec {
        type_: "Resource".to_string(),
        resource: Some(ResourceMetricSource {
            name: "cpu".to_string(),
            target: MetricTarget {
                type_: "Utilization".to_string(),
                average_utilization: Some(percent),
                ..Default::default()
            },
        }),
        ..Default::default()
    }
}

fn set_if_zero<T: Default + PartialEq>(field: &mut T, value: T) {
    if *field == T::default() {
        *field = value;
    }
}

fn set_if_blank(field: &mut Option<String>, value: &str) {
    if field.as_deref().is_none_or(str::is_empty) {
        *field = Some(value.to_string());
    }
}
