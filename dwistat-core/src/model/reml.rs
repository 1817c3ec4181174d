//! Average-Information REML for variance-component estimation.
//!
//! Estimates sigma2 = [sigma2_e, sigma2_1, ...] for the marginal covariance
//!   V = sigma2_e * I + sum_k sigma2_k * K_k
//! by iterating sigma2_new = sigma2 + AI^{-1} * score, where, with the REML
//! projection P = V^{-1} - V^{-1}X (X'V^{-1}X)^{-1} X'V^{-1} and A_k the
//! component kernels (A_0 = I):
//!   score_k = y'P A_k P y - tr(P A_k)
//!   AI_kl   = (A_k P y)' P (A_l P y)
//! The common 0.5 factor is omitted from both, so the Newton step is
//! unchanged. Steps are halved at the non-negativity boundary.

use anyhow::{anyhow, bail, Result};
use tracing::debug;

use dwistat_linalg::cholesky::CholeskyDecomp;
use dwistat_linalg::dense::DenseMatrix;

use super::random::RandomStructure;

/// Configuration for the REML iterations.
#[derive(Debug, Clone)]
pub struct RemlConfig {
    /// Maximum outer iterations.
    pub max_iter: usize,
    /// Relative-change convergence tolerance on the variance components.
    pub tol: f64,
    /// Floor applied to each component after every update.
    pub min_variance: f64,
}

impl Default for RemlConfig {
    fn default() -> Self {
        Self {
            max_iter: 50,
            tol: 1e-4,
            min_variance: 1e-10,
        }
    }
}

/// Converged REML estimate.
#[derive(Debug, Clone)]
pub struct RemlEstimate {
    /// Fixed-effect coefficients (GLS at the final components).
    pub beta: Vec<f64>,
    /// Covariance of beta: (X'V^{-1}X)^{-1}.
    pub cov_beta: DenseMatrix,
    /// Variance components [residual, component_1, ...].
    pub sigma2: Vec<f64>,
    /// REML log-likelihood (up to an additive constant).
    pub log_likelihood: f64,
    /// Iterations used.
    pub iterations: usize,
    /// Per-observation fitted values: X*beta + BLUPs.
    pub fitted: Vec<f64>,
}

/// Quantities derived from one factorization of V.
struct Projection {
    beta: Vec<f64>,
    cov_beta: DenseMatrix,
    py: Vec<f64>,
    p: DenseMatrix,
    log_det_v: f64,
    log_det_xtvx: f64,
}

fn assemble_v(n: usize, sigma2: &[f64], random: &RandomStructure) -> DenseMatrix {
    let mut v = DenseMatrix::zeros(n, n);
    for i in 0..n {
        v.set(i, i, sigma2[0]);
    }
    for (k, component) in random.components.iter().enumerate() {
        component.add_kernel_scaled(&mut v, sigma2[k + 1]);
    }
    v
}

fn project(y: &[f64], x: &DenseMatrix, v: &DenseMatrix) -> Result<Projection> {
    let chol_v = CholeskyDecomp::new(v)
        .map_err(|_| anyhow!("Marginal covariance matrix is not positive definite"))?;
    let vinv = chol_v.inverse();
    let vinv_x = chol_v.solve_matrix(x);
    let xtvx = x.transpose().mat_mul(&vinv_x);
    let chol_b = CholeskyDecomp::new(&xtvx)
        .map_err(|_| anyhow!("Singular fixed-effects covariance (rank-deficient design)"))?;
    let cov_beta = chol_b.inverse();

    let viy = chol_v.solve(y);
    let xtviy = x.xtv(&viy);
    let beta = chol_b.solve(&xtviy);

    let xb_adjust = vinv_x.mat_vec(&beta);
    let py: Vec<f64> = viy
        .iter()
        .zip(xb_adjust.iter())
        .map(|(a, b)| a - b)
        .collect();

    // P = V^{-1} - V^{-1}X (X'V^{-1}X)^{-1} (V^{-1}X)'
    let m = vinv_x.mat_mul(&cov_beta);
    let p = vinv.sub(&m.mat_mul(&vinv_x.transpose()));

    Ok(Projection {
        beta,
        cov_beta,
        py,
        p,
        log_det_v: chol_v.log_det(),
        log_det_xtvx: chol_b.log_det(),
    })
}

/// Fit the variance-component model by AI-REML.
///
/// `y` is the response, `x` the fixed-effects design (n x p), `random` the
/// grouping components. Non-convergence, a non-positive-definite V, and a
/// rank-deficient design are all fatal errors.
pub fn fit_reml(
    y: &[f64],
    x: &DenseMatrix,
    random: &RandomStructure,
    config: &RemlConfig,
) -> Result<RemlEstimate> {
    let n = y.len();
    let p = x.ncols();
    assert_eq!(x.nrows(), n);
    if n <= p {
        bail!(
            "Cannot fit model: {} observations for {} coefficients",
            n,
            p
        );
    }

    // OLS initialization: residual variance split evenly between the
    // residual and the grouping components.
    let xtx = x.xtx();
    let chol0 = CholeskyDecomp::new(&xtx)
        .map_err(|_| anyhow!("Singular design matrix (rank-deficient design)"))?;
    let beta0 = chol0.solve(&x.xtv(y));
    let xb0 = x.mat_vec(&beta0);
    let rss: f64 = y
        .iter()
        .zip(xb0.iter())
        .map(|(yi, fi)| (yi - fi) * (yi - fi))
        .sum();
    let s2 = rss / (n - p) as f64;
    if !s2.is_finite() || s2 <= 0.0 {
        bail!("Degenerate response: zero residual variance after OLS fit");
    }

    let n_components = random.components.len();
    let m = n_components + 1;
    let mut sigma2 = vec![0.0; m];
    sigma2[0] = 0.5 * s2;
    for k in 0..n_components {
        sigma2[k + 1] = 0.5 * s2 / n_components.max(1) as f64;
    }

    let mut converged = false;
    let mut n_iterations = 0;

    for iter in 0..config.max_iter {
        n_iterations = iter + 1;

        let v = assemble_v(n, &sigma2, random);
        let proj = project(y, x, &v)?;

        // A_k * P * y for each component (A_0 = I).
        let mut a_py: Vec<Vec<f64>> = Vec::with_capacity(m);
        a_py.push(proj.py.clone());
        for component in &random.components {
            a_py.push(component.kernel_vec(&proj.py));
        }

        // score_k = y'P A_k P y - tr(P A_k)
        let trace_p: f64 = proj.p.diag().iter().sum();
        let mut score = vec![0.0; m];
        score[0] = DenseMatrix::dot(&proj.py, &a_py[0]) - trace_p;
        for (k, component) in random.components.iter().enumerate() {
            score[k + 1] = DenseMatrix::dot(&proj.py, &a_py[k + 1])
                - component.kernel_trace_with(&proj.p);
        }

        // AI_kl = (A_k P y)' P (A_l P y)
        let p_a_py: Vec<Vec<f64>> = a_py.iter().map(|v| proj.p.mat_vec(v)).collect();
        let mut ai = DenseMatrix::zeros(m, m);
        for k in 0..m {
            for l in k..m {
                let val = DenseMatrix::dot(&a_py[k], &p_a_py[l]);
                ai.set(k, l, val);
                if k != l {
                    ai.set(l, k, val);
                }
            }
        }

        let delta = match CholeskyDecomp::new(&ai) {
            Ok(chol) => chol.solve(&score),
            Err(_) => {
                // Ridge fallback for components pinned at the boundary.
                let ridge = ai.diag().iter().sum::<f64>() / m as f64 * 1e-6 + 1e-12;
                let mut ai_reg = ai.clone();
                for k in 0..m {
                    ai_reg.add_at(k, k, ridge);
                }
                CholeskyDecomp::new(&ai_reg)
                    .map_err(|_| anyhow!("Average-information matrix is singular"))?
                    .solve(&score)
            }
        };

        // Step halving: keep every component non-negative.
        let mut step = 1.0;
        let mut candidate: Vec<f64>;
        loop {
            candidate = sigma2
                .iter()
                .zip(delta.iter())
                .map(|(s, d)| s + step * d)
                .collect();
            if candidate.iter().all(|&c| c >= 0.0) || step <= 1e-10 {
                break;
            }
            step *= 0.5;
        }
        for c in candidate.iter_mut() {
            *c = c.max(config.min_variance);
        }

        let max_change = sigma2
            .iter()
            .zip(candidate.iter())
            .map(|(old, new)| (new - old).abs() / (new.abs() + old.abs() + config.tol))
            .fold(0.0, f64::max);

        debug!(
            "REML iter {}: sigma2={:?}, change={:.2e}",
            iter, candidate, max_change
        );

        sigma2 = candidate;

        if max_change < config.tol {
            converged = true;
            break;
        }
    }

    if !converged {
        bail!(
            "REML did not converge after {} iterations",
            config.max_iter
        );
    }

    // Final pass at the converged components.
    let v = assemble_v(n, &sigma2, random);
    let proj = project(y, x, &v)?;

    let ypy = DenseMatrix::dot(y, &proj.py);
    let log_likelihood = -0.5 * (proj.log_det_v + proj.log_det_xtvx + ypy);

    // Fitted values: X*beta plus the BLUP of every grouping cell,
    // u_cell = sigma2_k * sum_{i in cell} (P y)_i.
    let mut fitted = x.mat_vec(&proj.beta);
    for (k, component) in random.components.iter().enumerate() {
        for cell in &component.levels {
            let u: f64 = sigma2[k + 1] * cell.iter().map(|&i| proj.py[i]).sum::<f64>();
            for &i in cell {
                fitted[i] += u;
            }
        }
    }

    Ok(RemlEstimate {
        beta: proj.beta,
        cov_beta: proj.cov_beta,
        sigma2,
        log_likelihood,
        iterations: n_iterations,
        fitted,
    })
}
