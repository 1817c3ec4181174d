#![allow(clippy::needless_range_loop)]
//! Cholesky decomposition and SPD solvers.
//!
//! The REML fitter factors the marginal covariance V once per iteration and
//! reuses the factor for solves, the inverse, and log|V|.

use thiserror::Error;

use crate::dense::DenseMatrix;

#[derive(Error, Debug)]
pub enum LinalgError {
    #[error("Matrix is not positive definite")]
    NotPositiveDefinite,

    #[error("Singular matrix encountered")]
    SingularMatrix,

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Cholesky factorization A = L * L' of a symmetric positive definite matrix.
pub struct CholeskyDecomp {
    /// Lower triangular factor L.
    pub l: DenseMatrix,
}

impl CholeskyDecomp {
    /// Factor a symmetric positive definite matrix.
    pub fn new(a: &DenseMatrix) -> Result<Self, LinalgError> {
        let n = a.nrows();
        if n != a.ncols() {
            return Err(LinalgError::DimensionMismatch {
                expected: n,
                got: a.ncols(),
            });
        }
        let mut l = DenseMatrix::zeros(n, n);

        for j in 0..n {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l.get(j, k) * l.get(j, k);
            }
            let diag = a.get(j, j) - sum;
            if diag <= 0.0 || !diag.is_finite() {
                return Err(LinalgError::NotPositiveDefinite);
            }
            l.set(j, j, diag.sqrt());

            for i in (j + 1)..n {
                let mut sum = 0.0;
                for k in 0..j {
                    sum += l.get(i, k) * l.get(j, k);
                }
                l.set(i, j, (a.get(i, j) - sum) / l.get(j, j));
            }
        }

        Ok(CholeskyDecomp { l })
    }

    /// Solve L * L' * x = b.
    pub fn solve(&self, b: &[f64]) -> Vec<f64> {
        let n = self.l.nrows();
        assert_eq!(b.len(), n);

        // Forward substitution: L * y = b
        let mut y = vec![0.0; n];
        for i in 0..n {
            let mut sum = 0.0;
            for j in 0..i {
                sum += self.l.get(i, j) * y[j];
            }
            y[i] = (b[i] - sum) / self.l.get(i, i);
        }

        // Backward substitution: L' * x = y
        let mut x = vec![0.0; n];
        for i in (0..n).rev() {
            let mut sum = 0.0;
            for j in (i + 1)..n {
                sum += self.l.get(j, i) * x[j];
            }
            x[i] = (y[i] - sum) / self.l.get(i, i);
        }

        x
    }

    /// Solve A * X = B column by column, returning X with B's shape.
    pub fn solve_matrix(&self, b: &DenseMatrix) -> DenseMatrix {
        let n = self.l.nrows();
        assert_eq!(b.nrows(), n);
        let mut x = DenseMatrix::zeros(n, b.ncols());
        for j in 0..b.ncols() {
            let col = self.solve(&b.col(j));
            x.set_col(j, &col);
        }
        x
    }

    /// Inverse of the factored matrix: A^{-1} = (L L')^{-1}.
    pub fn inverse(&self) -> DenseMatrix {
        let n = self.l.nrows();
        let mut inv = DenseMatrix::zeros(n, n);
        for j in 0..n {
            let mut e = vec![0.0; n];
            e[j] = 1.0;
            let col = self.solve(&e);
            inv.set_col(j, &col);
        }
        inv
    }

    /// log|A| = 2 * sum(log L_ii).
    pub fn log_det(&self) -> f64 {
        let n = self.l.nrows();
        let mut s = 0.0;
        for i in 0..n {
            s += self.l.get(i, i).ln();
        }
        2.0 * s
    }
}

/// Solve a symmetric positive definite system A*x = b.
pub fn solve_spd(a: &DenseMatrix, b: &[f64]) -> Result<Vec<f64>, LinalgError> {
    let chol = CholeskyDecomp::new(a)?;
    Ok(chol.solve(b))
}

/// Inverse of a symmetric positive definite matrix.
pub fn inverse_spd(a: &DenseMatrix) -> Result<DenseMatrix, LinalgError> {
    let chol = CholeskyDecomp::new(a)?;
    Ok(chol.inverse())
}
