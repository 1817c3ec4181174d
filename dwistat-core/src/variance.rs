//! Variance decomposition: intraclass correlation.

use anyhow::{bail, Result};
use serde::Serialize;

use crate::model::fitted::FittedModel;

/// Between-subject and residual variance with their intraclass correlation,
/// ICC = var_mouse / (var_mouse + var_residual).
#[derive(Debug, Clone, Serialize)]
pub struct IccSummary {
    pub var_mouse: f64,
    pub var_residual: f64,
    pub icc: f64,
}

/// Extract the subject-intercept and residual components from a fitted
/// model and compute the ICC.
pub fn icc_summary(model: &FittedModel) -> Result<IccSummary> {
    let var_mouse = match model.component_variance("mouse") {
        Some(v) => v,
        None => bail!("Fitted model has no 'mouse' variance component"),
    };
    let var_residual = match model.component_variance("residual") {
        Some(v) => v,
        None => bail!("Fitted model has no residual variance component"),
    };
    let total = var_mouse + var_residual;
    if total <= 0.0 {
        bail!("Total variance is not positive: {}", total);
    }
    Ok(IccSummary {
        var_mouse,
        var_residual,
        icc: var_mouse / total,
    })
}
