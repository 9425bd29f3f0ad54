use k8s_openapi::api::networking::v1::{
    NetworkPolicy, NetworkPolicyIngressRule, NetworkPolicyPort,
    NetworkPolicySpec,
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use super::{EXPORTER_PORT, MEMCACHED_PORT, RenderContext};

/// Ingress policy restricting who may talk to the cache pods.
pub fn build(ctx: &RenderContext<'_>) -> Option<NetworkPolicy> {
    let np = ctx.spec.enabled_network_policy()?;
    let port = |p: i32| NetworkPolicyPort {
        port: Some(IntOrString::Int(p)),
        protocol: Some("TCP".to_string()),
        ..Default::default()
    };
    let mut ingress = vec![NetworkPolicyIngressRule {
        from: (!np.allowed_sources.is_empty())
            .then(|| np.allowed_sources.clone()),
        ports: Some(vec![port(MEMCACHED_PORT)]),
    }];
    // metrics stay reachable for any scraper
    if ctx.spec.monitoring_enabled() {
        ingress.push(NetworkPolicyIngressRule {
            from: None,
            ports: Some(vec![port(EXPORTER_PORT)]),
        });
    }
    Some(NetworkPolicy {
        metadata: ctx.metadata(),
        spec: Some(NetworkPolicySpec {
            pod_selector: ctx.selector(),
            policy_types: Some(vec!["Ingress".to_string()]),
            ingress: Some(ingress),
            ..Default::default()
        }),
    })
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::networking::v1::NetworkPolicyPeer;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

    use super::*;
    use crate::crd::hub::{
        MemcachedSpec, MonitoringSpec, NetworkPolicySpec as NpSpec,
        SecuritySpec,
    };
    use crate::templates::test_fixtures::memcached;

    fn spec(sources: Vec<NetworkPolicyPeer>, monitoring: bool) -> MemcachedSpec {
        MemcachedSpec {
            security: Some(SecuritySpec {
                network_policy: Some(NpSpec {
                    enabled: true,
                    allowed_sources: sources,
                }),
                ..Default::default()
            }),
            monitoring: monitoring.then(|| MonitoringSpec {
                enabled: true,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn restricts_cache_port_to_allowed_sources() {
        let peer = NetworkPolicyPeer {
            pod_selector: Some(LabelSelector::default()),
            ..Default::default()
        };
        let mc = memcached(spec(vec![peer.clone()], false));
        let np = build(&RenderContext::new(&mc).unwrap()).unwrap();
        let ingress = np.spec.unwrap().ingress.unwrap();
        assert_eq!(ingress.len(), 1);
        assert_eq!(ingress[0].from, Some(vec![peer]));
        assert_eq!(
            ingress[0].ports.as_ref().unwrap()[0].port,
            Some(IntOrString::Int(11211))
        );
    }

    #[test]
    fn monitoring_opens_metrics_port() {
        let mc = memcached(spec(vec![], true));
        let np = build(&RenderContext::new(&mc).unwrap()).unwrap();
        let ingress = np.spec.unwrap().ingress.unwrap();
        assert_eq!(ingress.len(), 2);
        assert!(ingress[0].from.is_none());
        assert_eq!(
            ingress[1].ports.as_ref().unwrap()[0].port,
            Some(IntOrString::Int(9150))
        );
    }

    #[test]
    fn selects_the_cache_pods_for_ingress() {
        let mc = memcached(spec(vec![], false));
        let np = build(&RenderContext::new(&mc).unwrap()).unwrap();
        let spec = np.spec.unwrap();
        assert_eq!(
            spec.pod_selector.match_labels.unwrap()["app.kubernetes.io/instance"],
            "cache"
        );
        assert_eq!(spec.policy_types, Some(vec!["Ingress".to_string()]));
        assert!(spec.egress.is_none());
    }

    #[test]
    fn absent_policy_builds_nothing() {
        let mc = memcached(MemcachedSpec::default());
        assert!(build(&RenderContext::new(&mc).unwrap()).is_none());
    }
}
