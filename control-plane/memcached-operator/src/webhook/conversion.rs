use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use kube::core::Status;
use kube::core::conversion::{
    ConversionRequest, ConversionResponse, ConversionReview,
};
use tracing::{debug, warn};

use super::WebhookState;
use crate::conversion::convert_object;
use crate::crd::Registry;

pub const REASON_CONVERSION_FAILED: &str = "ConversionFailed";

pub async fn convert_handler(
    State(state): State<Arc<WebhookState>>,
    Json(review): Json<ConversionReview>,
) -> Json<ConversionReview> {
    let req = match ConversionRequest::from_review(review) {
        Ok(req) => req,
        Err(e) => {
            warn!(error = %e, "invalid conversion review");
            return Json(
                ConversionResponse::invalid(Status::failure(
                    &e.to_string(),
                    "InvalidRequest",
                ))
                .into_review(),
            );
        }
    };
    Json(convert(&state.registry, req).into_review())
}

/// Convert every object in the request; any failure fails the whole review.
pub fn convert(
    registry: &Registry,
    mut req: ConversionRequest,
) -> ConversionResponse {
    let desired = req.desired_api_version.clone();
    let objects = std::mem::take(&mut req.objects);
    let count = objects.len();
    let converted = objects
        .into_iter()
        .map(|obj| convert_object(registry, obj, &desired))
        .collect::<Result<Vec<_>, _>>();
    let resp = ConversionResponse::for_request(req);
    match converted {
        Ok(objects) => {
            debug!(%desired, count, "converted");
            resp.success(objects)
        }
        Err(e) => {
            warn!(%desired, error = %e, "conversion failed");
            resp.failure(Status::failure(
                &e.to_string(),
                REASON_CONVERSION_FAILED,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn request(desired: &str, objects: Vec<Value>) -> ConversionRequest {
        let review: ConversionReview = serde_json::from_value(json!({
            "apiVersion": "apiextensions.k8s.io/v1",
            "kind": "ConversionReview",
            "request": {
                "uid": "conv-1",
                "desiredAPIVersion": desired,
                "objects": objects
            }
        }))
        .unwrap();
        ConversionRequest::from_review(review).unwrap()
    }

    fn alpha(name: &str) -> Value {
        json!({
            "apiVersion": "cache.oaas.io/v1alpha1",
            "kind": "Memcached",
            "metadata": {"name": name, "namespace": "prod"},
            "spec": {"security": {"tls": {"enabled": true, "certificateSecretName": "certs"}}}
        })
    }

    #[test]
    fn converts_every_object() {
        let resp = convert(
            &Registry::new(),
            request("cache.oaas.io/v1beta1", vec![alpha("a"), alpha("b")]),
        );
        let review = resp.into_review();
        let resp = review.response.unwrap();
        assert_eq!(resp.uid, "conv-1");
        assert_eq!(resp.converted_objects.len(), 2);
        assert_eq!(
            resp.converted_objects[1]["spec"]["security"]["tls"]["certificateSecretRef"]["name"],
            "certs"
        );
    }

    #[test]
    fn one_bad_object_fails_the_review() {
        let mut wrong = alpha("b");
        wrong["kind"] = json!("Redis");
        let resp = convert(
            &Registry::new(),
            request("cache.oaas.io/v1beta1", vec![alpha("a"), wrong]),
        );
        let resp = resp.into_review().response.unwrap();
        assert!(resp.converted_objects.is_empty());
        assert!(resp.result.message.contains("type mismatch"));
    }

    #[test]
    fn unknown_target_version_fails() {
        let resp = convert(
            &Registry::new(),
            request("cache.oaas.io/v2", vec![alpha("a")]),
        );
        let resp = resp.into_review().response.unwrap();
        assert!(resp.result.message.contains("unknown apiVersion"));
    }
}
