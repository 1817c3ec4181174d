//! dwistat-linalg: dense linear algebra for the dwistat pipeline.
//!
//! A thin wrapper over faer's column-major `Mat<f64>` plus the Cholesky
//! decomposition the REML fitter leans on (solve, inverse, log-determinant).

pub mod cholesky;
pub mod dense;
