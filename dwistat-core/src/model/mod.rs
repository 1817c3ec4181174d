//! Mixed-model fitting.
//!
//! `fit_model` is the pipeline entry point: it assembles the fixed-effects
//! design and the variance-component structure from a cleaned table, runs the
//! REML fitter, and packages the result as a [`fitted::FittedModel`].

pub mod fitted;
pub mod random;
pub mod reml;

use anyhow::Result;
use statrs::distribution::{ContinuousCDF, Normal};
use tracing::info;

use dwistat_data::AnalysisTable;

use crate::design::build_design;
use self::fitted::{FittedModel, FixedEffect, VarianceComponent};
use self::random::mouse_structure;
use self::reml::{fit_reml, RemlConfig};

/// Fit the regional mixed model: sum-coded Group x Time x Region fixed
/// effects, with mouse, mouse:time, and mouse:region variance components.
pub fn fit_model(table: &AnalysisTable, config: &RemlConfig) -> Result<FittedModel> {
    let design = build_design(table)?;
    let random = mouse_structure(table);
    let y: Vec<f64> = table.observations.iter().map(|o| o.value).collect();

    info!(
        "Fitting mixed model: {} observations, {} coefficients, {} variance components + residual",
        y.len(),
        design.n_coefficients(),
        random.components.len()
    );

    let estimate = fit_reml(&y, &design.x, &random, config)?;

    let normal = Normal::new(0.0, 1.0).unwrap();
    let coefficients: Vec<FixedEffect> = design
        .coef_names
        .iter()
        .enumerate()
        .map(|(j, name)| {
            let est = estimate.beta[j];
            let se = estimate.cov_beta.get(j, j).sqrt();
            let z = est / se;
            let p = 2.0 * (1.0 - normal.cdf(z.abs()));
            FixedEffect {
                name: name.clone(),
                estimate: est,
                std_err: se,
                z_value: z,
                p_value: p,
            }
        })
        .collect();

    let mut variance_components: Vec<VarianceComponent> = random
        .components
        .iter()
        .zip(estimate.sigma2.iter().skip(1))
        .map(|(c, &v)| VarianceComponent {
            name: c.name.clone(),
            variance: v,
        })
        .collect();
    variance_components.push(VarianceComponent {
        name: "residual".to_string(),
        variance: estimate.sigma2[0],
    });

    info!(
        "REML converged in {} iterations, log-likelihood {:.4}",
        estimate.iterations, estimate.log_likelihood
    );

    Ok(FittedModel {
        n_obs: y.len(),
        coefficients,
        terms: design.terms,
        variance_components,
        log_likelihood: estimate.log_likelihood,
        iterations: estimate.iterations,
        fitted_values: estimate.fitted,
        cov_beta_flat: estimate.cov_beta.to_col_major(),
    })
}
