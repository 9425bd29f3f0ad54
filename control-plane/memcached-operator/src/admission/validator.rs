use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use super::FieldViolation;
use super::quantity::{MIB, parse_quantity};
use crate::crd::hub::{Memcached, MemcachedSpec};

/// Headroom the memcached process needs above its item storage.
pub const MEMORY_OVERHEAD_MB: i32 = 32;

/// A named check over the hub spec.
pub struct Rule {
    pub name: &'static str,
    pub check: fn(&MemcachedSpec) -> Vec<FieldViolation>,
}

pub const RULES: &[Rule] = &[
    Rule {
        name: "memory-limit-sufficiency",
        check: memory_limit_sufficiency,
    },
    Rule {
        name: "disruption-budget-consistency",
        check: disruption_budget_consistency,
    },
    Rule {
        name: "graceful-shutdown-timing",
        check: graceful_shutdown_timing,
    },
    Rule {
        name: "secret-reference-presence",
        check: secret_reference_presence,
    },
    Rule {
        name: "autoscaling-replica-exclusivity",
        check: autoscaling_replica_exclusivity,
    },
    Rule {
        name: "autoscaling-bounds",
        check: autoscaling_bounds,
    },
    Rule {
        name: "autoscaling-cpu-metric-requirement",
        check: autoscaling_cpu_metric_requirement,
    },
    Rule {
        name: "cache-config-bounds",
        check: cache_config_bounds,
    },
];

pub fn validate_memcached(obj: &Memcached) -> Vec<FieldViolation> {
    validate_spec(&obj.spec)
}

/// Run every rule and collect all violations.
pub fn validate_spec(spec: &MemcachedSpec) -> Vec<FieldViolation> {
    RULES.iter().flat_map(|rule| (rule.check)(spec)).collect()
}

fn memory_limit_sufficiency(spec: &MemcachedSpec) -> Vec<FieldViolation> {
    const FIELD: &str = "spec.resources.limits.memory";
    let limit = spec
        .resources
        .as_ref()
        .and_then(|r| r.limits.as_ref())
        .and_then(|l| l.get("memory"));
    let ceiling = spec
        .memcached
        .as_ref()
        .map(|m| m.max_memory_mb)
        .filter(|mb| *mb > 0);
    let (Some(limit), Some(mb)) = (limit, ceiling) else {
        return vec![];
    };
    let bytes = match parse_quantity(limit) {
        Ok(b) => b,
        Err(e) => return vec![FieldViolation::new(FIELD, e.to_string())],
    };
    let required_mb = mb + MEMORY_OVERHEAD_MB;
    if bytes < f64::from(required_mb) * MIB {
        return vec![FieldViolation::new(
            FIELD,
            format!(
                "memory limit {} must be at least {}Mi (maxMemoryMB {} + \
                 {}Mi overhead)",
                limit.0, required_mb, mb, MEMORY_OVERHEAD_MB
            ),
        )];
    }
    vec![]
}

fn disruption_budget_consistency(spec: &MemcachedSpec) -> Vec<FieldViolation> {
    const FIELD: &str = "spec.highAvailability.podDisruptionBudget";
    let Some(pdb) = spec.enabled_pdb() else {
        return vec![];
    };
    let mut out = vec![];
    match (&pdb.min_available, &pdb.max_unavailable) {
        (Some(_), Some(_)) => out.push(FieldViolation::new(
            FIELD,
            "minAvailable and maxUnavailable are mutually exclusive",
        )),
        (None, None) => out.push(FieldViolation::new(
            FIELD,
            "one of minAvailable or maxUnavailable is required when enabled",
        )),
        _ => {}
    }
    if let (Some(IntOrString::Int(min)), Some(replicas)) =
        (&pdb.min_available, spec.replicas)
    {
        if *min >= replicas {
            out.push(FieldViolation::new(
                format!("{FIELD}.minAvailable"),
                format!(
                    "minAvailable ({min}) must be less than replicas \
                     ({replicas})"
                ),
            ));
        }
    }
    out
}

fn graceful_shutdown_timing(spec: &MemcachedSpec) -> Vec<FieldViolation> {
    let Some(gs) = spec.enabled_graceful_shutdown() else {
        return vec![];
    };
    if gs.termination_grace_period_seconds
        <= i64::from(gs.pre_stop_delay_seconds)
    {
        return vec![FieldViolation::new(
            "spec.highAvailability.gracefulShutdown.terminationGracePeriodSeconds",
            format!(
                "terminationGracePeriodSeconds ({}) must be greater than \
                 preStopDelaySeconds ({})",
                gs.termination_grace_period_seconds, gs.pre_stop_delay_seconds
            ),
        )];
    }
    vec![]
}

fn secret_reference_presence(spec: &MemcachedSpec) -> Vec<FieldViolation> {
    let mut out = vec![];
    if let Some(sasl) = spec.enabled_sasl() {
        if sasl.credentials_secret_ref.name.trim().is_empty() {
            out.push(FieldViolation::new(
                "spec.security.sasl.credentialsSecretRef.name",
                "a credentials secret is required when SASL is enabled",
            ));
        }
    }
    if let Some(tls) = spec.enabled_tls() {
        if tls.certificate_secret_ref.name.trim().is_empty() {
            out.push(FieldViolation::new(
                "spec.security.tls.certificateSecretRef.name",
                "a certificate secret is required when TLS is enabled",
            ));
        }
    }
    out
}

fn autoscaling_replica_exclusivity(
    spec: &MemcachedSpec,
) -> Vec<FieldViolation> {
    match spec.replicas {
        Some(replicas) if spec.autoscaling_enabled() => {
            vec![FieldViolation::new(
                "spec.replicas",
                format!(
                    "replicas ({replicas}) must not be set when autoscaling \
                     is enabled"
                ),
            )]
        }
        _ => vec![],
    }
}

fn autoscaling_bounds(spec: &MemcachedSpec) -> Vec<FieldViolation> {
    let Some(hpa) = spec.autoscaling.as_ref() else {
        return vec![];
    };
    let mut out = vec![];
    if hpa.enabled && hpa.max_replicas < 1 {
        out.push(FieldViolation::new(
            "spec.autoscaling.maxReplicas",
            format!(
                "maxReplicas ({}) must be at least 1 when autoscaling is \
                 enabled",
                hpa.max_replicas
            ),
        ));
    }
    if let Some(min) = hpa.min_replicas {
        if hpa.max_replicas > 0 && min > hpa.max_replicas {
            out.push(FieldViolation::new(
                "spec.autoscaling.minReplicas",
                format!(
                    "minReplicas ({min}) must be less than or equal to \
                     maxReplicas ({})",
                    hpa.max_replicas
                ),
            ));
        }
    }
    out
}

fn autoscaling_cpu_metric_requirement(
    spec: &MemcachedSpec,
) -> Vec<FieldViolation> {
    let Some(hpa) = spec.autoscaling.as_ref() else {
        return vec![];
    };
    let wants_cpu_utilization = hpa.metrics.iter().any(|m| {
        m.type_ == "Resource"
            && m.resource.as_ref().is_some_and(|r| {
                r.name == "cpu" && r.target.type_ == "Utilization"
            })
    });
    let has_cpu_request = spec
        .resources
        .as_ref()
        .and_then(|r| r.requests.as_ref())
        .is_some_and(|r| r.contains_key("cpu"));
    if wants_cpu_utilization && !has_cpu_request {
        return vec![FieldViolation::new(
            "spec.resources.requests.cpu",
            "a cpu request is required by the cpu Utilization autoscaling \
             metric",
        )];
    }
    vec![]
}

fn cache_config_bounds(spec: &MemcachedSpec) -> Vec<FieldViolation> {
    let Some(mc) = spec.memcached.as_ref() else {
        return vec![];
    };
    let mut out = vec![];
    let mut bound = |field: &str, value: i32, min: i32, max: i32| {
        if !(min..=max).contains(&value) {
            out.push(FieldViolation::new(
                format!("spec.memcached.{field}"),
                format!("{field} ({value}) must be within [{min}, {max}]"),
            ));
        }
    };
    bound("maxMemoryMB", mc.max_memory_mb, 16, 65536);
    bound("maxConnections", mc.max_connections, 1, 65536);
    bound("threads", mc.threads, 1, 128);
    bound("verbosity", mc.verbosity, 0, 2);
    if !valid_item_size(&mc.max_item_size) {
        out.push(FieldViolation::new(
            "spec.memcached.maxItemSize",
            format!(
                "maxItemSize {:?} must be a number followed by k or m",
                mc.max_item_size
            ),
        ));
    }
    out
}

fn valid_item_size(s: &str) -> bool {
    match s.strip_suffix(['k', 'm']) {
        Some(digits) => {
            !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}
