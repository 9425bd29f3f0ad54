use serde_json::{Value as JsonValue, json};
use tracing::{debug, trace};

use crate::crd::hub::MemcachedStatus;
use crate::crd::{Condition, ConditionStatus, ConditionType};

pub const REASON_READY: &str = "MinimumReplicasAvailable";
pub const REASON_NOT_READY: &str = "MinimumReplicasUnavailable";
pub const REASON_RECONCILED: &str = "ReconcileSucceeded";
pub const REASON_FAILED: &str = "ReconcileFailed";

/// Availability of the workload: true when at least `desired` pods (and at
/// least one) are ready.
pub fn available(ready: i32, desired: i32) -> Condition {
    if ready >= desired && ready > 0 {
        Condition::new(
            ConditionType::Available,
            ConditionStatus::True,
            REASON_READY,
            format!("{ready}/{desired} replicas ready"),
        )
    } else {
        Condition::new(
            ConditionType::Available,
            ConditionStatus::False,
            REASON_NOT_READY,
            format!("{ready}/{desired} replicas ready"),
        )
    }
}

pub fn reconciled() -> Condition {
    Condition::new(
        ConditionType::Degraded,
        ConditionStatus::False,
        REASON_RECONCILED,
        "all child objects are up to date",
    )
}

pub fn degraded(message: impl Into<String>) -> Condition {
    Condition::new(
        ConditionType::Degraded,
        ConditionStatus::True,
        REASON_FAILED,
        message,
    )
}

/// Upsert `incoming` by type, keeping the previous transition time when the
/// status value did not change. Result is ordered by [`ConditionType::rank`].
pub fn upsert_conditions(
    existing: &[Condition],
    incoming: Vec<Condition>,
    now: &str,
) -> Vec<Condition> {
    let mut out: Vec<Condition> = existing.to_vec();
    for mut inc in incoming {
        match out.iter().position(|c| c.type_ == inc.type_) {
            Some(idx) => {
                inc.last_transition_time = if out[idx].status == inc.status {
                    out[idx].last_transition_time.clone()
                } else {
                    Some(now.to_string())
                };
                out[idx] = inc;
            }
            None => {
                inc.last_transition_time = Some(now.to_string());
                out.push(inc);
            }
        }
    }
    out.sort_by_key(|c| c.type_.rank());
    out
}

/// Compare two statuses ignoring condition transition times.
pub fn should_patch_status(
    current: Option<&MemcachedStatus>,
    desired: &MemcachedStatus,
) -> bool {
    match current {
        None => {
            debug!("should_patch_status: no current status, patching");
            true
        }
        Some(cur) => {
            let differs = normalize_status(cur) != normalize_status(desired);
            if differs {
                debug!("should_patch_status: status differs, patching");
            } else {
                trace!("should_patch_status: status identical, skipping patch");
            }
            differs
        }
    }
}

fn normalize_status(s: &MemcachedStatus) -> JsonValue {
    let mut v = serde_json::to_value(s).unwrap_or_else(|_| json!({}));
    if let Some(JsonValue::Array(conds)) = v.get_mut("conditions") {
        for c in conds.iter_mut() {
            if let Some(obj) = c.as_object_mut() {
                obj.remove("lastTransitionTime");
            }
        }
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn availability_needs_desired_and_at_least_one() {
        assert_eq!(available(3, 3).status, ConditionStatus::True);
        assert_eq!(available(2, 3).status, ConditionStatus::False);
        assert_eq!(available(0, 0).status, ConditionStatus::False);
    }

    #[test]
    fn upsert_keeps_transition_time_when_status_is_unchanged() {
        let first = upsert_conditions(&[], vec![available(0, 1)], "t0");
        assert_eq!(first[0].last_transition_time.as_deref(), Some("t0"));

        let same = upsert_conditions(&first, vec![available(0, 1)], "t1");
        assert_eq!(same[0].last_transition_time.as_deref(), Some("t0"));

        let flipped = upsert_conditions(&same, vec![available(1, 1)], "t2");
        assert_eq!(flipped[0].last_transition_time.as_deref(), Some("t2"));
        assert_eq!(flipped.len(), 1);
    }

    #[test]
    fn upsert_orders_by_rank() {
        let out = upsert_conditions(
            &[reconciled()],
            vec![available(1, 1)],
            "t0",
        );
        let types: Vec<_> = out.iter().map(|c| c.type_).collect();
        assert_eq!(types, [ConditionType::Available, ConditionType::Degraded]);
    }

    #[test]
    fn transition_time_alone_does_not_trigger_patch() {
        let a = MemcachedStatus {
            conditions: upsert_conditions(&[], vec![available(1, 1)], "t0"),
            ready_replicas: 1,
            observed_generation: Some(2),
        };
        let mut b = a.clone();
        b.conditions[0].last_transition_time = Some("t9".into());
        assert!(!should_patch_status(Some(&a), &b));
        b.ready_replicas = 2;
        assert!(should_patch_status(Some(&a), &b));
        assert!(should_patch_status(None, &a));
    }
}
