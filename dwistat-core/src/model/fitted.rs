//! The fitted mixed model and its JSON sidecar.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use dwistat_linalg::dense::DenseMatrix;

use crate::design::Term;

/// One fixed-effect coefficient row.
#[derive(Debug, Clone, Serialize)]
pub struct FixedEffect {
    pub name: String,
    pub estimate: f64,
    pub std_err: f64,
    pub z_value: f64,
    pub p_value: f64,
}

/// One named variance component.
#[derive(Debug, Clone, Serialize)]
pub struct VarianceComponent {
    pub name: String,
    pub variance: f64,
}

/// The fitted model. Immutable after fitting; everything downstream
/// (Wald tests, contrasts, ICC, export) reads from here.
#[derive(Debug, Clone, Serialize)]
pub struct FittedModel {
    pub n_obs: usize,
    pub coefficients: Vec<FixedEffect>,
    /// Model terms and the coefficient indices they span.
    pub terms: Vec<Term>,
    /// Grouping components plus the trailing "residual" entry.
    pub variance_components: Vec<VarianceComponent>,
    /// REML log-likelihood (up to an additive constant).
    pub log_likelihood: f64,
    pub iterations: usize,
    /// Per-observation predicted values (fixed part + BLUPs), in table order.
    pub fitted_values: Vec<f64>,
    /// Coefficient covariance, column-major p x p.
    pub cov_beta_flat: Vec<f64>,
}

impl FittedModel {
    pub fn n_coefficients(&self) -> usize {
        self.coefficients.len()
    }

    /// Coefficient covariance as a matrix.
    pub fn cov_beta(&self) -> DenseMatrix {
        let p = self.n_coefficients();
        DenseMatrix::from_col_major(p, p, self.cov_beta_flat.clone())
    }

    /// Variance of a named component, if present.
    pub fn component_variance(&self, name: &str) -> Option<f64> {
        self.variance_components
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.variance)
    }
}

/// Human-readable summary, printed after a fit.
pub fn model_summary(model: &FittedModel) -> String {
    let components = model
        .variance_components
        .iter()
        .map(|c| format!("{}={:.6}", c.name, c.variance))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Regional DWI mixed model\n\
         Observations: {}\n\
         Coefficients: {}\n\
         Variance components: {}\n\
         REML log-likelihood: {:.4}\n\
         Iterations: {}",
        model.n_obs,
        model.n_coefficients(),
        components,
        model.log_likelihood,
        model.iterations,
    )
}

/// Save a pretty-printed JSON sidecar for inspection.
pub fn save_model_json(model: &FittedModel, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(model)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write model sidecar: {}", path.display()))?;
    Ok(())
}
