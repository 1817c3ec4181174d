//! dwistat-core: statistics for longitudinal regional DWI metrics.
//!
//! Implements the analysis pipeline stages: sum-coded design matrices for the
//! Group x Time x Region interaction, REML fitting of the variance-component
//! mixed model, omnibus Wald tests, FDR-adjusted pairwise contrasts, variance
//! decomposition (ICC), and the multi-sheet workbook export.

pub mod design;
pub mod infer;
pub mod model;
pub mod posthoc;
pub mod report;
pub mod variance;
