//! Webhook endpoints through the full router.

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use memcached_operator::crd::Registry;
use memcached_operator::web::build_router;
use memcached_operator::webhook::WebhookState;
use serde_json::{Value, json};
use tower::ServiceExt;

fn router() -> axum::Router {
    build_router(WebhookState::new(Registry::new()))
}

async fn post(uri: &str, body: Value) -> (StatusCode, Value) {
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let resp = router().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn admission_review(version: &str, operation: &str, spec: Value) -> Value {
    json!({
        "apiVersion": "admission.k8s.io/v1",
        "kind": "AdmissionReview",
        "request": {
            "uid": "9f1c",
            "kind": {"group": "cache.oaas.io", "version": version, "kind": "Memcached"},
            "resource": {"group": "cache.oaas.io", "version": version, "resource": "memcacheds"},
            "name": "cache",
            "namespace": "prod",
            "operation": operation,
            "userInfo": {"username": "alice"},
            "object": {
                "apiVersion": format!("cache.oaas.io/{version}"),
                "kind": "Memcached",
                "metadata": {"name": "cache", "namespace": "prod"},
                "spec": spec
            },
            "dryRun": false
        }
    })
}

#[test_log::test(tokio::test)]
async fn health_endpoints_respond() {
    for path in ["/health", "/healthz"] {
        let req = Request::builder().uri(path).body(Body::empty()).unwrap();
        let resp = router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}

#[test_log::test(tokio::test)]
async fn mutate_returns_json_patch() {
    let (status, body) = post(
        "/mutate/v1beta1/memcached",
        admission_review("v1beta1", "CREATE", json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let resp = &body["response"];
    assert_eq!(resp["uid"], "9f1c");
    assert_eq!(resp["allowed"], true);
    assert_eq!(resp["patchType"], "JSONPatch");
    let bytes: Vec<u8> = serde_json::from_value(resp["patch"].clone()).unwrap();
    let ops: Value = serde_json::from_slice(&bytes).unwrap();
    let ops = ops.as_array().unwrap();
    assert!(!ops.is_empty());
    assert!(
        ops.iter()
            .all(|op| op["path"].as_str().is_some_and(|p| p.starts_with("/spec")))
    );
}

#[test_log::test(tokio::test)]
async fn validate_rejects_with_422_and_causes() {
    let spec = json!({
        "replicas": 3,
        "autoscaling": {"enabled": true, "minReplicas": 5, "maxReplicas": 2}
    });
    let (status, body) = post(
        "/validate/v1beta1/memcached",
        admission_review("v1beta1", "CREATE", spec),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let resp = &body["response"];
    assert_eq!(resp["allowed"], false);
    assert_eq!(resp["status"]["code"], 422);
    assert_eq!(resp["status"]["reason"], "Invalid");
    let causes = resp["status"]["details"]["causes"].as_array().unwrap();
    assert!(causes.iter().any(|c| c["field"] == "spec.replicas"));
    assert!(
        resp["status"]["message"]
            .as_str()
            .unwrap()
            .contains("spec.replicas")
    );
}

#[test_log::test(tokio::test)]
async fn spoke_validate_uses_its_own_route() {
    let spec = json!({
        "security": {"sasl": {"enabled": true}}
    });
    let (_, body) = post(
        "/validate/v1alpha1/memcached",
        admission_review("v1alpha1", "CREATE", spec),
    )
    .await;
    let resp = &body["response"];
    assert_eq!(resp["allowed"], false);
    let causes = resp["status"]["details"]["causes"].as_array().unwrap();
    assert!(
        causes
            .iter()
            .any(|c| c["field"] == "spec.security.sasl.credentialsSecretRef.name")
    );
}

#[test_log::test(tokio::test)]
async fn convert_round_trips_through_the_hub() {
    let review = json!({
        "apiVersion": "apiextensions.k8s.io/v1",
        "kind": "ConversionReview",
        "request": {
            "uid": "c0nv",
            "desiredAPIVersion": "cache.oaas.io/v1beta1",
            "objects": [{
                "apiVersion": "cache.oaas.io/v1alpha1",
                "kind": "Memcached",
                "metadata": {"name": "cache", "namespace": "prod"},
                "spec": {"replicas": 2}
            }]
        }
    });
    let (status, body) = post("/convert", review).await;
    assert_eq!(status, StatusCode::OK);
    let resp = &body["response"];
    assert_eq!(resp["uid"], "c0nv");
    assert_eq!(resp["result"]["status"], "Success");
    let objects = resp["convertedObjects"].as_array().unwrap();
    assert_eq!(objects[0]["apiVersion"], "cache.oaas.io/v1beta1");
    assert_eq!(objects[0]["spec"]["replicas"], 2);
}

#[test_log::test(tokio::test)]
async fn convert_failure_fails_the_review() {
    let review = json!({
        "apiVersion": "apiextensions.k8s.io/v1",
        "kind": "ConversionReview",
        "request": {
            "uid": "c0nv",
            "desiredAPIVersion": "cache.oaas.io/v9",
            "objects": [{
                "apiVersion": "cache.oaas.io/v1alpha1",
                "kind": "Memcached",
                "metadata": {"name": "cache"},
                "spec": {}
            }]
        }
    });
    let (_, body) = post("/convert", review).await;
    assert_eq!(body["response"]["result"]["status"], "Failure");
}
