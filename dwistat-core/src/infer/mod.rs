//! Omnibus Wald chi-square tests.
//!
//! For every fixed-effect term spanning more than one coefficient, tests the
//! null that all of the term's coefficients are zero:
//!   chi2 = beta_J' (Cov_JJ)^{-1} beta_J ~ chi-sq(|J|)

use anyhow::{anyhow, Result};
use serde::Serialize;
use statrs::distribution::{ChiSquared, ContinuousCDF};

use dwistat_linalg::cholesky::CholeskyDecomp;
use dwistat_linalg::dense::DenseMatrix;

use crate::model::fitted::FittedModel;

/// One omnibus test row: the canonical (chi2, df, p_val) triple plus the
/// term name.
#[derive(Debug, Clone, Serialize)]
pub struct WaldTest {
    pub term: String,
    pub chi2: f64,
    pub df: usize,
    pub p_val: f64,
}

/// Upper-tail chi-square probability at (chi2, df). `df` must be positive.
pub fn chi_square_upper_tail(chi2: f64, df: f64) -> f64 {
    let dist = ChiSquared::new(df).unwrap();
    1.0 - dist.cdf(chi2)
}

/// Run the omnibus Wald test for every multi-degree-of-freedom term.
pub fn wald_tests(model: &FittedModel) -> Result<Vec<WaldTest>> {
    let cov = model.cov_beta();
    let mut tests = Vec::new();

    for term in &model.terms {
        if term.cols.len() < 2 {
            continue;
        }
        let beta_j: Vec<f64> = term
            .cols
            .iter()
            .map(|&j| model.coefficients[j].estimate)
            .collect();
        let cov_jj = cov.submatrix(&term.cols);
        let chol = CholeskyDecomp::new(&cov_jj).map_err(|_| {
            anyhow!(
                "Singular coefficient covariance for term {:?}",
                term.name
            )
        })?;
        let solved = chol.solve(&beta_j);
        let chi2 = DenseMatrix::dot(&beta_j, &solved);
        let df = term.cols.len();
        tests.push(WaldTest {
            term: term.name.clone(),
            chi2,
            df,
            p_val: chi_square_upper_tail(chi2, df as f64),
        });
    }

    Ok(tests)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::Term;
    use crate::model::fitted::{FixedEffect, VarianceComponent};

    #[test]
    fn test_chi_square_upper_tail_known_point() {
        // The textbook 5% critical value for one degree of freedom.
        let p = chi_square_upper_tail(3.84, 1.0);
        assert!((p - 0.05).abs() < 1e-3, "p={}", p);
    }

    #[test]
    fn test_chi_square_upper_tail_bounds() {
        assert!((chi_square_upper_tail(0.0, 3.0) - 1.0).abs() < 1e-12);
        assert!(chi_square_upper_tail(1e3, 3.0) < 1e-12);
    }

    fn model_with_two_df_term(estimates: &[f64], cov_diag: f64) -> FittedModel {
        let p = estimates.len();
        let mut cov_flat = vec![0.0; p * p];
        for j in 0..p {
            cov_flat[j * p + j] = cov_diag;
        }
        FittedModel {
            n_obs: 10,
            coefficients: estimates
                .iter()
                .enumerate()
                .map(|(j, &e)| FixedEffect {
                    name: format!("b{}", j),
                    estimate: e,
                    std_err: cov_diag.sqrt(),
                    z_value: e / cov_diag.sqrt(),
                    p_value: 1.0,
                })
                .collect(),
            terms: vec![
                Term {
                    name: "Intercept".into(),
                    cols: vec![0],
                },
                Term {
                    name: "Group".into(),
                    cols: (1..p).collect(),
                },
            ],
            variance_components: vec![VarianceComponent {
                name: "residual".into(),
                variance: 1.0,
            }],
            log_likelihood: 0.0,
            iterations: 1,
            fitted_values: vec![0.0; 10],
            cov_beta_flat: cov_flat,
        }
    }

    #[test]
    fn test_wald_skips_single_df_terms() {
        let model = model_with_two_df_term(&[1.0, 0.5, -0.5], 0.25);
        let tests = wald_tests(&model).unwrap();
        assert_eq!(tests.len(), 1);
        assert_eq!(tests[0].term, "Group");
        assert_eq!(tests[0].df, 2);
    }

    #[test]
    fn test_wald_statistic_diagonal_cov() {
        // With diagonal covariance, chi2 = sum(beta^2) / var.
        let model = model_with_two_df_term(&[1.0, 0.5, -0.5], 0.25);
        let tests = wald_tests(&model).unwrap();
        let expected = (0.25 + 0.25) / 0.25;
        assert!((tests[0].chi2 - expected).abs() < 1e-10, "chi2={}", tests[0].chi2);
        assert!(tests[0].p_val > 0.0 && tests[0].p_val < 1.0);
    }
}
