use k8s_openapi::api::autoscaling::v2::{
    CrossVersionObjectReference, HorizontalPodAutoscaler,
    HorizontalPodAutoscalerSpec,
};

use super::{BuildError, ChildKind, RenderContext};

pub fn build(
    ctx: &RenderContext<'_>,
) -> Result<Option<HorizontalPodAutoscaler>, BuildError> {
    let Some(hpa) = ctx.spec.autoscaling.as_ref().filter(|a| a.enabled) else {
        return Ok(None);
    };
    if hpa.max_replicas < 1 {
        return Err(BuildError::InvalidSpec {
            kind: ChildKind::HorizontalPodAutoscaler,
            reason: format!("maxReplicas is {}", hpa.max_replicas),
        });
    }
    Ok(Some(HorizontalPodAutoscaler {
        metadata: ctx.metadata(),
        spec: Some(HorizontalPodAutoscalerSpec {
            scale_target_ref: CrossVersionObjectReference {
                api_version: Some("apps/v1".to_string()),
                kind: "Deployment".to_string(),
                name: ctx.name.to_string(),
            },
            min_replicas: hpa.min_replicas,
            max_replicas: hpa.max_replicas,
            metrics: (!hpa.metrics.is_empty()).then(|| hpa.metrics.clone()),
            behavior: hpa.behavior.clone(),
        }),
        ..Default::default()
    }))
}
