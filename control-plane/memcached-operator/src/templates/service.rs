use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use super::{
    EXPORTER_PORT, EXPORTER_PORT_NAME, MEMCACHED_PORT, MEMCACHED_PORT_NAME,
    RenderContext,
};

/// Headless Service so clients can shard over the individual pod addresses.
pub fn build(ctx: &RenderContext<'_>) -> Service {
    let mut ports = vec![ServicePort {
        name: Some(MEMCACHED_PORT_NAME.to_string()),
        port: MEMCACHED_PORT,
        target_port: Some(IntOrString::String(
            MEMCACHED_PORT_NAME.to_string(),
        )),
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }];
    if ctx.spec.monitoring_enabled() {
        ports.push(ServicePort {
            name: Some(EXPORTER_PORT_NAME.to_string()),
            port: EXPORTER_PORT,
            target_port: Some(IntOrString::String(
                EXPORTER_PORT_NAME.to_string(),
            )),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        });
    }

    let mut metadata = ctx.metadata();
    metadata.annotations = ctx
        .spec
        .service
        .as_ref()
        .map(|s| s.annotations.clone())
        .filter(|a| !a.is_empty());

    Service {
        metadata,
        spec: Some(ServiceSpec {
            cluster_ip: Some("None".to_string()),
            selector: Some(ctx.labels()),
            ports: Some(ports),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::crd::hub::{MemcachedSpec, MonitoringSpec, ServiceConfig};
    use crate::templates::test_fixtures::memcached;

    fn render(spec: MemcachedSpec) -> Service {
        let mc = memcached(spec);
        build(&RenderContext::new(&mc).unwrap())
    }

    #[test]
    fn headless_with_memcached_port() {
        let svc = render(MemcachedSpec::default());
        let spec = svc.spec.unwrap();
        assert_eq!(spec.cluster_ip.as_deref(), Some("None"));
        let ports = spec.ports.unwrap();
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].port, 11211);
        assert!(svc.metadata.annotations.is_none());
    }

    #[test]
    fn monitoring_exposes_metrics_port_and_annotations_copy() {
        let svc = render(MemcachedSpec {
            monitoring: Some(MonitoringSpec {
                enabled: true,
                ..Default::default()
            }),
            service: Some(ServiceConfig {
                annotations: BTreeMap::from([(
                    "example.com/tier".to_string(),
                    "cache".to_string(),
                )]),
            }),
            ..Default::default()
        });
        let ports = svc.spec.unwrap().ports.unwrap();
        assert_eq!(ports[1].name.as_deref(), Some("metrics"));
        assert_eq!(ports[1].port, 9150);
        assert_eq!(svc.metadata.annotations.unwrap()["example.com/tier"], "cache");
    }
}
