//! Mutating and validating admission for Memcached documents.

use axum::Json;
use kube::core::admission::{
    AdmissionRequest, AdmissionResponse, AdmissionReview, Operation,
};
use kube::core::DynamicObject;
use kube::core::response::{StatusCause, StatusDetails};
use kube::{Resource, ResourceExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::admission::{AdmissionHooks, ValidationError};
use crate::crd::{GROUP, KIND};

pub const REASON_INVALID: &str = "Invalid";
pub const CAUSE_FIELD_VALUE_INVALID: &str = "FieldValueInvalid";

/// Allow the request with a JSON patch carrying the defaulting changes.
pub fn mutate<K>(
    hooks: AdmissionHooks<K>,
    req: &AdmissionRequest<K>,
) -> AdmissionResponse
where
    K: Resource + Clone + Serialize,
{
    let resp = AdmissionResponse::from(req);
    let Some(obj) = req.object.as_ref() else {
        return resp;
    };
    let mut defaulted = obj.clone();
    (hooks.default)(&mut defaulted);

    let (before, after) =
        match (serde_json::to_value(obj), serde_json::to_value(&defaulted)) {
            (Ok(before), Ok(after)) => (before, after),
            (Err(e), _) | (_, Err(e)) => {
                warn!(uid = %req.uid, error = %e, "cannot encode object");
                return resp.deny(format!("cannot encode object: {e}"));
            }
        };
    let patch = json_patch::diff(&before, &after);
    if patch.0.is_empty() {
        debug!(uid = %req.uid, "nothing to default");
        return resp;
    }
    debug!(uid = %req.uid, ops = patch.0.len(), "defaulting patch");
    match resp.with_patch(patch) {
        Ok(resp) => resp,
        Err(e) => AdmissionResponse::from(req)
            .deny(format!("patch serialization error: {e}")),
    }
}

/// Allow, or deny with every rule violation listed. Deletes are not checked.
pub fn validate<K>(
    hooks: AdmissionHooks<K>,
    req: &AdmissionRequest<K>,
) -> AdmissionResponse
where
    K: Resource,
{
    let resp = AdmissionResponse::from(req);
    if req.operation == Operation::Delete {
        return resp;
    }
    let Some(obj) = req.object.as_ref() else {
        return resp;
    };
    match ValidationError::check(obj.name_any(), (hooks.validate)(obj)) {
        Ok(()) => resp,
        Err(err) => {
            info!(
                uid = %req.uid,
                name = %err.name,
                violations = err.violations.len(),
                "rejecting invalid memcached"
            );
            deny_invalid(resp, &err)
        }
    }
}

fn deny_invalid(
    resp: AdmissionResponse,
    err: &ValidationError,
) -> AdmissionResponse {
    let mut resp = resp.deny(err.to_string());
    resp.result.code = 422;
    resp.result.reason = REASON_INVALID.to_string();
    resp.result.details = Some(StatusDetails {
        name: err.name.clone(),
        group: GROUP.to_string(),
        kind: KIND.to_string(),
        causes: err
            .violations
            .iter()
            .map(|v| StatusCause {
                reason: CAUSE_FIELD_VALUE_INVALID.to_string(),
                message: v.message.clone(),
                field: v.field.clone(),
            })
            .collect(),
        uid: String::new(),
        retry_after_seconds: 0,
    });
    resp
}

/// Unwrap the review, run `handle` and wrap the response.
pub(super) fn respond<K>(
    review: AdmissionReview<K>,
    handle: impl FnOnce(&AdmissionRequest<K>) -> AdmissionResponse,
) -> Json<AdmissionReview<DynamicObject>>
where
    K: Resource,
{
    let req: AdmissionRequest<K> = match review.try_into() {
        Ok(req) => req,
        Err(e) => {
            warn!(error = %e, "invalid admission review");
            return Json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };
    Json(handle(&req).into_review())
}
