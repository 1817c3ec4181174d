//! dwistat-data: tabular input handling for the dwistat pipeline.
//!
//! Parses the long-format regional metrics table (one measurement per
//! mouse/time/region/metric), normalizes and validates the categorical
//! grouping fields, and bridges the upstream wide-format extraction output
//! into the long format the analysis expects.

pub mod categories;
pub mod import;
pub mod table;

pub use categories::{Group, TimePoint};
pub use table::{AnalysisTable, Observation};
