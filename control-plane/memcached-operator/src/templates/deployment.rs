use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Affinity, Container, ContainerPort, ExecAction, Lifecycle,
    LifecycleHandler, PodAffinityTerm, PodAntiAffinity, PodSpec,
    PodTemplateSpec, Probe, SecretVolumeSource, TCPSocketAction, Volume,
    VolumeMount, WeightedPodAffinityTerm,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use super::{
    BuildError, EXPORTER_PORT, EXPORTER_PORT_NAME, MEMCACHED_PORT,
    MEMCACHED_PORT_NAME, RenderContext,
};
use crate::admission::defaulter::{DEFAULT_EXPORTER_IMAGE, DEFAULT_IMAGE};
use crate::crd::hub::{AntiAffinityPreset, MemcachedSpec};

pub const SASL_MOUNT_PATH: &str = "/etc/memcached/sasl";
pub const TLS_MOUNT_PATH: &str = "/etc/memcached/tls";
const SASL_VOLUME: &str = "sasl-credentials";
const TLS_VOLUME: &str = "tls-certificates";
const HOSTNAME_TOPOLOGY_KEY: &str = "kubernetes.io/hostname";

pub fn build(ctx: &RenderContext<'_>) -> Result<Deployment, BuildError> {
    let spec = &ctx.spec;
    let labels = ctx.labels();

    let mut containers = vec![memcached_container(spec)];
    if let Some(mon) = spec.monitoring.as_ref().filter(|m| m.enabled) {
        containers.push(Container {
            name: "exporter".to_string(),
            image: Some(
                mon.exporter_image
                    .clone()
                    .unwrap_or_else(|| DEFAULT_EXPORTER_IMAGE.to_string()),
            ),
            args: Some(vec![format!(
                "--memcached.address=localhost:{MEMCACHED_PORT}"
            )]),
            ports: Some(vec![ContainerPort {
                name: Some(EXPORTER_PORT_NAME.to_string()),
                container_port: EXPORTER_PORT,
                ..Default::default()
            }]),
            resources: mon.exporter_resources.clone(),
            security_context: spec
                .security
                .as_ref()
                .and_then(|s| s.container_security_context.clone()),
            ..Default::default()
        });
    }

    let ha = spec.high_availability.as_ref();
    let affinity = ha
        .and_then(|ha| ha.anti_affinity_preset)
        .map(|preset| anti_affinity(preset, ctx));
    let topology_spread_constraints = ha
        .map(|ha| ha.topology_spread_constraints.clone())
        .filter(|c| !c.is_empty())
        .map(|constraints| {
            constraints
                .into_iter()
                .map(|mut c| {
                    if c.label_selector.is_none() {
                        c.label_selector = Some(ctx.selector());
                    }
                    c
                })
                .collect()
        });

    let pod = PodSpec {
        containers,
        affinity,
        topology_spread_constraints,
        termination_grace_period_seconds: spec
            .enabled_graceful_shutdown()
            .map(|g| g.termination_grace_period_seconds),
        security_context: spec
            .security
            .as_ref()
            .and_then(|s| s.pod_security_context.clone()),
        volumes: volumes(spec),
        ..Default::default()
    };

    // the autoscaler owns the replica count when enabled
    let replicas = if spec.autoscaling_enabled() {
        None
    } else {
        Some(spec.replicas.unwrap_or(1))
    };

    Ok(Deployment {
        metadata: ctx.metadata(),
        spec: Some(DeploymentSpec {
            replicas,
            selector: ctx.selector(),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(pod),
            },
            ..Default::default()
        }),
        ..Default::default()
    })
}

fn memcached_container(spec: &MemcachedSpec) -> Container {
    let probe = Probe {
        tcp_socket: Some(TCPSocketAction {
            port: IntOrString::String(MEMCACHED_PORT_NAME.to_string()),
            ..Default::default()
        }),
        initial_delay_seconds: Some(5),
        period_seconds: Some(10),
        ..Default::default()
    };
    let lifecycle = spec.enabled_graceful_shutdown().map(|g| Lifecycle {
        pre_stop: Some(LifecycleHandler {
            exec: Some(ExecAction {
                command: Some(vec![
                    "sleep".to_string(),
                    g.pre_stop_delay_seconds.to_string(),
                ]),
            }),
            ..Default::default()
        }),
        ..Default::default()
    });

    let mut mounts = vec![];
    if spec.enabled_sasl().is_some() {
        mounts.push(VolumeMount {
            name: SASL_VOLUME.to_string(),
            mount_path: SASL_MOUNT_PATH.to_string(),
            read_only: Some(true),
            ..Default::default()
        });
    }
    if spec.enabled_tls().is_some() {
        mounts.push(VolumeMount {
            name: TLS_VOLUME.to_string(),
            mount_path: TLS_MOUNT_PATH.to_string(),
            read_only: Some(true),
            ..Default::default()
        });
    }

    Container {
        name: "memcached".to_string(),
        image: Some(
            spec.image
                .clone()
                .unwrap_or_else(|| DEFAULT_IMAGE.to_string()),
        ),
        args: Some(memcached_args(spec)),
        ports: Some(vec![ContainerPort {
            name: Some(MEMCACHED_PORT_NAME.to_string()),
            container_port: MEMCACHED_PORT,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        resources: spec.resources.clone(),
        readiness_probe: Some(probe.clone()),
        liveness_probe: Some(Probe {
            initial_delay_seconds: Some(15),
            ..probe
        }),
        lifecycle,
        security_context: spec
            .security
            .as_ref()
            .and_then(|s| s.container_security_context.clone()),
        volume_mounts: (!mounts.is_empty()).then_some(mounts),
        ..Default::default()
    }
}

/// Command line for the memcached process.
pub fn memcached_args(spec: &MemcachedSpec) -> Vec<String> {
    let mc = spec.memcached.clone().unwrap_or_default();
    let mut args = vec![
        "-m".to_string(),
        mc.max_memory_mb.to_string(),
        "-c".to_string(),
        mc.max_connections.to_string(),
        "-t".to_string(),
        mc.threads.to_string(),
        "-I".to_string(),
        mc.max_item_size.clone(),
    ];
    match mc.verbosity {
        v if v >= 2 => args.push("-vv".to_string()),
        1 => args.push("-v".to_string()),
        _ => {}
    }
    if spec.enabled_sasl().is_some() {
        args.push("-Y".to_string());
        args.push(format!("{SASL_MOUNT_PATH}/password-file"));
    }
    if let Some(tls) = spec.enabled_tls() {
        args.push("-Z".to_string());
        args.push("-o".to_string());
        args.push(format!("ssl_chain_cert={TLS_MOUNT_PATH}/tls.crt"));
        args.push("-o".to_string());
        args.push(format!("ssl_key={TLS_MOUNT_PATH}/tls.key"));
        if tls.enable_client_cert {
            args.push("-o".to_string());
            args.push(format!("ssl_ca_cert={TLS_MOUNT_PATH}/ca.crt"));
            args.push("-o".to_string());
            args.push("ssl_verify_mode=3".to_string());
        }
    }
    args.extend(mc.extra_args.iter().cloned());
    args
}

fn volumes(spec: &MemcachedSpec) -> Option<Vec<Volume>> {
    let secret_volume = |name: &str, secret: &str| Volume {
        name: name.to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(secret.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    };
    let mut out = vec![];
    if let Some(sasl) = spec.enabled_sasl() {
        out.push(secret_volume(SASL_VOLUME, &sasl.credentials_secret_ref.name));
    }
    if let Some(tls) = spec.enabled_tls() {
        out.push(secret_volume(TLS_VOLUME, &tls.certificate_secret_ref.name));
    }
    (!out.is_empty()).then_some(out)
}

fn anti_affinity(
    preset: AntiAffinityPreset,
    ctx: &RenderContext<'_>,
) -> Affinity {
    let term = PodAffinityTerm {
        label_selector: Some(ctx.selector()),
        topology_key: HOSTNAME_TOPOLOGY_KEY.to_string(),
        ..Default::default()
    };
    let anti = match preset {
        AntiAffinityPreset::Soft => PodAntiAffinity {
            preferred_during_scheduling_ignored_during_execution: Some(vec![
                WeightedPodAffinityTerm {
                    weight: 100,
                    pod_affinity_term: term,
                },
            ]),
            ..Default::default()
        },
        AntiAffinityPreset::Hard => PodAntiAffinity {
            required_during_scheduling_ignored_during_execution: Some(vec![
                term,
            ]),
            ..Default::default()
        },
    };
    Affinity {
        pod_anti_affinity: Some(anti),
        ..Default::default()
    }
}
