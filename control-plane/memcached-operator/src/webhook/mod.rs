//! HTTP endpoints called by the API server: admission per served revision
//! and CRD conversion.

pub mod admission;
pub mod conversion;

use std::sync::Arc;

use axum::{Json, Router, routing::post};
use kube::Resource;
use kube::core::admission::AdmissionReview;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::admission::{AdmissionHooks, hub_hooks, v1alpha1_hooks};
use crate::crd::{Registry, hub, v1alpha1 as alpha};

/// Shared state of the webhook routes.
#[derive(Clone, Debug, Default)]
pub struct WebhookState {
    pub registry: Registry,
}

impl WebhookState {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }
}

/// `/mutate/{version}/memcached` and `/validate/{version}/memcached` for one
/// concrete document type.
pub fn admission_routes<K>(version: &str, hooks: AdmissionHooks<K>) -> Router
where
    K: Resource + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    Router::new()
        .route(
            &format!("/mutate/{version}/memcached"),
            post(move |Json(review): Json<AdmissionReview<K>>| async move {
                admission::respond(review, |req| admission::mutate(hooks, req))
            }),
        )
        .route(
            &format!("/validate/{version}/memcached"),
            post(move |Json(review): Json<AdmissionReview<K>>| async move {
                admission::respond(review, |req| admission::validate(hooks, req))
            }),
        )
}

pub fn webhook_router(state: WebhookState) -> Router {
    Router::new()
        .route("/convert", post(conversion::convert_handler))
        .with_state(Arc::new(state))
        .merge(admission_routes::<hub::Memcached>("v1beta1", hub_hooks()))
        .merge(admission_routes::<alpha::Memcached>("v1alpha1", v1alpha1_hooks()))
}
