use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use serde_json::json;

use super::{EXPORTER_PORT_NAME, RenderContext};
use crate::admission::defaulter::{
    DEFAULT_SCRAPE_INTERVAL, DEFAULT_SCRAPE_TIMEOUT,
};

pub fn api_resource() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind::gvk(
        "monitoring.coreos.com",
        "v1",
        "ServiceMonitor",
    ))
}

/// Prometheus Operator scrape target for the exporter sidecar.
pub fn build(ctx: &RenderContext<'_>) -> Option<DynamicObject> {
    let sm = ctx.spec.enabled_service_monitor()?;
    let mut metadata = ctx.metadata();
    if let Some(labels) = metadata.labels.as_mut() {
        labels.extend(sm.additional_labels.clone());
    }
    let interval = sm.interval.as_deref().unwrap_or(DEFAULT_SCRAPE_INTERVAL);
    let scrape_timeout = sm
        .scrape_timeout
        .as_deref()
        .unwrap_or(DEFAULT_SCRAPE_TIMEOUT);

    let mut obj = DynamicObject::new(ctx.name, &api_resource()).data(json!({
        "spec": {
            "selector": { "matchLabels": ctx.labels() },
            "namespaceSelector": { "matchNames": [ctx.namespace] },
            "endpoints": [{
                "port": EXPORTER_PORT_NAME,
                "interval": interval,
                "scrapeTimeout": scrape_timeout,
            }],
        }
    }));
    obj.metadata = metadata;
    Some(obj)
}
