//! Field-level drift detection between a desired child and its live copy.
//!
//! Only tracked fields are compared. A desired value is satisfied when the
//! live value covers it: objects may carry extra (server-defaulted) keys,
//! arrays must have the same length and cover element-wise, scalars must be
//! equal. Subtrees the operator owns outright are compared exactly instead,
//! so a key dropped from desired is drift while it is still live. Null and
//! empty values count as absent.

use serde_json::Value;

use crate::templates::ChildKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// Absent in desired means it must be absent in live too.
    Required,
    /// Only compared when desired sets it; the server may default it.
    IfSet,
    /// Absent in desired means live holds the API server default.
    DefaultsTo(i64),
    /// Compared key for key; nothing extra may be live.
    Exact,
}

#[derive(Debug, Clone, Copy)]
pub struct TrackedField {
    pub pointer: &'static str,
    pub presence: Presence,
    /// Keys of the object (or of each array element) under `pointer` that
    /// are compared exactly.
    pub owned: &'static [&'static str],
}

const fn req(pointer: &'static str) -> TrackedField {
    TrackedField {
        pointer,
        presence: Presence::Required,
        owned: &[],
    }
}

const fn if_set(pointer: &'static str) -> TrackedField {
    TrackedField {
        pointer,
        presence: Presence::IfSet,
        owned: &[],
    }
}

const fn exact(pointer: &'static str) -> TrackedField {
    TrackedField {
        pointer,
        presence: Presence::Exact,
        owned: &[],
    }
}

/// Container keys with no server defaults.
const CONTAINER_OWNED: &[&str] = &[
    "args",
    "lifecycle",
    "resources",
    "securityContext",
    "volumeMounts",
];

/// Pod default when `terminationGracePeriodSeconds` is unset.
pub const DEFAULT_TERMINATION_GRACE_PERIOD: i64 = 30;

const COMMON: &[TrackedField] = &[
    exact("/metadata/labels"),
    req("/metadata/ownerReferences"),
];

const DEPLOYMENT: &[TrackedField] = &[
    if_set("/spec/replicas"),
    req("/spec/selector"),
    exact("/spec/template/metadata/labels"),
    TrackedField {
        pointer: "/spec/template/spec/containers",
        presence: Presence::Required,
        owned: CONTAINER_OWNED,
    },
    req("/spec/template/spec/affinity"),
    req("/spec/template/spec/topologySpreadConstraints"),
    TrackedField {
        pointer: "/spec/template/spec/terminationGracePeriodSeconds",
        presence: Presence::DefaultsTo(DEFAULT_TERMINATION_GRACE_PERIOD),
        owned: &[],
    },
    exact("/spec/template/spec/securityContext"),
    req("/spec/template/spec/volumes"),
];

const SERVICE: &[TrackedField] = &[
    exact("/metadata/annotations"),
    req("/spec/clusterIP"),
    req("/spec/selector"),
    req("/spec/ports"),
];

const PDB: &[TrackedField] = &[
    req("/spec/minAvailable"),
    req("/spec/maxUnavailable"),
    req("/spec/selector"),
];

const HPA: &[TrackedField] = &[
    req("/spec/scaleTargetRef"),
    if_set("/spec/minReplicas"),
    req("/spec/maxReplicas"),
    req("/spec/metrics"),
    if_set("/spec/behavior"),
];

const SERVICE_MONITOR: &[TrackedField] = &[exact("/spec")];

const NETWORK_POLICY: &[TrackedField] = &[
    req("/spec/podSelector"),
    req("/spec/policyTypes"),
    req("/spec/ingress"),
];

pub fn tracked_fields(kind: ChildKind) -> impl Iterator<Item = &'static TrackedField> {
    let specific = match kind {
        ChildKind::Deployment => DEPLOYMENT,
        ChildKind::Service => SERVICE,
        ChildKind::PodDisruptionBudget => PDB,
        ChildKind::HorizontalPodAutoscaler => HPA,
        ChildKind::ServiceMonitor => SERVICE_MONITOR,
        ChildKind::NetworkPolicy => NETWORK_POLICY,
    };
    COMMON.iter().chain(specific)
}

/// Pointers of tracked fields where `live` does not match `desired`.
pub fn drifted_fields(
    kind: ChildKind,
    desired: &Value,
    live: &Value,
) -> Vec<&'static str> {
    tracked_fields(kind)
        .filter(|f| {
            let d = present(desired.pointer(f.pointer));
            let l = present(live.pointer(f.pointer));
            match (d, l, f.presence) {
                (Some(d), Some(l), Presence::Exact) => !matches_exactly(d, l),
                (Some(d), Some(l), _) => {
                    !(covers(d, l) && owned_match(d, l, f.owned))
                }
                (Some(_), None, _) => true,
                (None, Some(l), Presence::DefaultsTo(default)) => {
                    l.as_i64() != Some(default)
                }
                (None, Some(_), Presence::Required | Presence::Exact) => true,
                (None, _, _) => false,
            }
        })
        .map(|f| f.pointer)
        .collect()
}

fn present(v: Option<&Value>) -> Option<&Value> {
    v.filter(|v| !is_empty(v))
}

fn is_empty(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Object(m) => m.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// True when every value set in `desired` is present and equal in `live`.
pub fn covers(desired: &Value, live: &Value) -> bool {
    match (desired, live) {
        (Value::Object(d), Value::Object(l)) => d.iter().all(|(k, dv)| {
            if is_empty(dv) {
                return l.get(k).is_none_or(is_empty);
            }
            l.get(k).is_some_and(|lv| covers(dv, lv))
        }),
        (Value::Array(d), Value::Array(l)) => {
            d.len() == l.len() && d.iter().zip(l).all(|(dv, lv)| covers(dv, lv))
        }
        (d, l) => d == l,
    }
}

/// True when both sides set the same keys to the same values.
pub fn matches_exactly(desired: &Value, live: &Value) -> bool {
    match (desired, live) {
        (Value::Object(d), Value::Object(l)) => {
            d.keys().chain(l.keys()).all(|k| {
                match (present(d.get(k)), present(l.get(k))) {
                    (Some(dv), Some(lv)) => matches_exactly(dv, lv),
                    (None, None) => true,
                    _ => false,
                }
            })
        }
        (Value::Array(d), Value::Array(l)) => {
            d.len() == l.len()
                && d.iter().zip(l).all(|(dv, lv)| matches_exactly(dv, lv))
        }
        (d, l) => d == l,
    }
}

/// Compare the `owned` keys of an object, or of each element of an array,
/// exactly.
fn owned_match(desired: &Value, live: &Value, owned: &[&str]) -> bool {
    if owned.is_empty() {
        return true;
    }
    match (desired, live) {
        (Value::Array(d), Value::Array(l)) => d.len() == l.len()
            && d.iter().zip(l).all(|(dv, lv)| owned_match(dv, lv, owned)),
        (Value::Object(d), Value::Object(l)) => owned.iter().all(|k| {
            match (present(d.get(*k)), present(l.get(*k))) {
                (Some(dv), Some(lv)) => matches_exactly(dv, lv),
                (None, None) => true,
                _ => false,
            }
        }),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn server_defaults_do_not_count_as_drift() {
        let desired = json!({
            "spec": {"template": {"spec": {"containers": [
                {"name": "memcached", "image": "memcached:1.6"}
            ]}}}
        });
        let live = json!({
            "spec": {
                "replicas": 1,
                "template": {"spec": {
                    "containers": [{
                        "name": "memcached",
                        "image": "memcached:1.6",
                        "imagePullPolicy": "IfNotPresent",
                        "terminationMessagePath": "/dev/termination-log"
                    }],
                    "terminationGracePeriodSeconds": 30,
                    "securityContext": {}
                }}
            }
        });
        assert!(drifted_fields(ChildKind::Deployment, &desired, &live).is_empty());
    }

    #[test]
    fn changed_and_extra_tracked_values_drift() {
        let desired = json!({"spec": {"replicas": 3, "template": {"spec": {
            "containers": [{"name": "memcached", "image": "memcached:1.6"}]
        }}}});
        let live = json!({"spec": {"replicas": 1, "template": {"spec": {
            "containers": [{"name": "memcached", "image": "memcached:1.5"}],
            "affinity": {}
        }}}});
        // an empty affinity object counts as absent
        assert_eq!(
            drifted_fields(ChildKind::Deployment, &desired, &live),
            vec!["/spec/replicas", "/spec/template/spec/containers"]
        );

        let live = json!({"spec": {"replicas": 3, "template": {"spec": {
            "containers": [{"name": "memcached", "image": "memcached:1.6"}],
            "volumes": [{"name": "sasl-credentials"}]
        }}}});
        assert_eq!(
            drifted_fields(ChildKind::Deployment, &desired, &live),
            vec!["/spec/template/spec/volumes"]
        );
    }

    #[test]
    fn arrays_must_match_length() {
        assert!(!covers(&json!([1]), &json!([1, 2])));
        assert!(covers(&json!([{"a": 1}]), &json!([{"a": 1, "b": 2}])));
    }

    #[test]
    fn pdb_switch_from_min_to_max_drifts() {
        let desired = json!({"spec": {"maxUnavailable": 1}});
        let live = json!({"spec": {"minAvailable": 2}});
        assert_eq!(
            drifted_fields(ChildKind::PodDisruptionBudget, &desired, &live),
            vec!["/spec/minAvailable", "/spec/maxUnavailable"]
        );
    }

    #[test]
    fn owned_container_keys_left_in_live_drift() {
        let desired = json!({"spec": {"template": {"spec": {
            "containers": [{"name": "memcached", "image": "memcached:1.6"}]
        }}}});
        let live = json!({"spec": {"template": {"spec": {
            "containers": [{
                "name": "memcached",
                "image": "memcached:1.6",
                "lifecycle": {"preStop": {"exec": {"command": ["sleep", "5"]}}},
                "resources": {}
            }],
            "terminationGracePeriodSeconds": 20
        }}}});
        assert_eq!(
            drifted_fields(ChildKind::Deployment, &desired, &live),
            vec![
                "/spec/template/spec/containers",
                "/spec/template/spec/terminationGracePeriodSeconds"
            ]
        );
    }

    #[test]
    fn dropped_limit_drifts() {
        let container = |resources: Value| {
            json!({"spec": {"template": {"spec": {"containers": [
                {"name": "memcached", "resources": resources}
            ]}}}})
        };
        let desired = container(json!({"limits": {"memory": "256Mi"}}));
        let live =
            container(json!({"limits": {"memory": "256Mi", "cpu": "1"}}));
        assert_eq!(
            drifted_fields(ChildKind::Deployment, &desired, &live),
            vec!["/spec/template/spec/containers"]
        );
        assert!(drifted_fields(ChildKind::Deployment, &desired, &desired).is_empty());
    }

    #[test]
    fn removed_labels_and_annotations_drift() {
        let desired = json!({"metadata": {"labels": {"app": "memcached"}}});
        let live = json!({"metadata": {
            "labels": {"app": "memcached", "release": "prometheus"},
            "annotations": {"a": "b"}
        }});
        assert_eq!(
            drifted_fields(ChildKind::Service, &desired, &live),
            vec!["/metadata/labels", "/metadata/annotations"]
        );
    }

    #[test]
    fn exact_match_ignores_empty_values() {
        assert!(matches_exactly(&json!({"a": 1, "b": {}}), &json!({"a": 1, "c": null})));
        assert!(!matches_exactly(&json!({"a": 1}), &json!({"a": 1, "c": 2})));
    }

    #[test]
    fn missing_owner_reference_drifts() {
        let desired = json!({"metadata": {"ownerReferences": [{"uid": "u"}]}});
        let live = json!({"metadata": {}});
        assert_eq!(
            drifted_fields(ChildKind::Service, &desired, &live),
            vec!["/metadata/ownerReferences"]
        );
    }
}
