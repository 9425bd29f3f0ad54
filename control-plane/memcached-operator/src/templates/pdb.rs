use k8s_openapi::api::policy::v1::{
    PodDisruptionBudget, PodDisruptionBudgetSpec,
};

use super::RenderContext;

pub fn build(ctx: &RenderContext<'_>) -> Option<PodDisruptionBudget> {
    let pdb = ctx.spec.enabled_pdb()?;
    Some(PodDisruptionBudget {
        metadata: ctx.metadata(),
        spec: Some(PodDisruptionBudgetSpec {
            min_available: pdb.min_available.clone(),
            max_unavailable: pdb.max_unavailable.clone(),
            selector: Some(ctx.selector()),
            ..Default::default()
        }),
        ..Default::default()
    })
}
