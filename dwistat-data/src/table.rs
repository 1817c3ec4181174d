//! Long-format observation table parser and cleaner.
//!
//! Reads the delimited regional metrics file, renames its columns to the
//! internal schema, filters to one metric, validates the categorical fields,
//! and drops records missing a key field.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tracing::{debug, info};

use crate::categories::{Group, TimePoint};

/// Input column holding the subject identifier.
const COL_MOUSE: &str = "Mouse Name";
/// Remaining required input columns, lower-case in the source file.
const COL_GROUP: &str = "group";
const COL_TIME: &str = "time";
const COL_REGION: &str = "region";
const COL_VALUE: &str = "value";
const COL_METRIC: &str = "metric";

/// One cleaned measurement: a single subject/time/region value for the
/// selected metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub mouse_id: String,
    pub group: Group,
    pub time: TimePoint,
    pub region: String,
    pub value: f64,
}

/// The cleaned observation table consumed by the model fitter.
#[derive(Debug, Clone)]
pub struct AnalysisTable {
    pub observations: Vec<Observation>,
}

impl AnalysisTable {
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Sorted unique region labels. These define the Region factor levels.
    pub fn region_levels(&self) -> Vec<String> {
        let mut levels: Vec<String> = self
            .observations
            .iter()
            .map(|o| o.region.clone())
            .collect();
        levels.sort();
        levels.dedup();
        levels
    }

    /// Sorted unique mouse ids.
    pub fn mouse_levels(&self) -> Vec<String> {
        let mut levels: Vec<String> = self
            .observations
            .iter()
            .map(|o| o.mouse_id.clone())
            .collect();
        levels.sort();
        levels.dedup();
        levels
    }
}

/// Load and clean the long-format metrics table, keeping only rows for the
/// given metric label.
pub fn load_table(path: &Path, metric: &str) -> Result<AnalysisTable> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read metrics table: {}", path.display()))?;
    let table = parse_table(&contents, metric)
        .with_context(|| format!("Failed to parse metrics table: {}", path.display()))?;
    info!(
        "Loaded {} observations for metric {:?} from {}",
        table.len(),
        metric,
        path.display()
    );
    Ok(table)
}

/// Parse the table from its text contents. Split out from [`load_table`] so
/// cleaning behavior is testable without touching the filesystem.
pub fn parse_table(contents: &str, metric: &str) -> Result<AnalysisTable> {
    let mut lines = contents.lines().enumerate();
    let (_, header_line) = lines.next().ok_or_else(|| anyhow::anyhow!("Empty input table"))?;

    // Comma-delimited by default; tab tolerated.
    let delim = if header_line.contains('\t') { '\t' } else { ',' };
    let headers: Vec<&str> = header_line.split(delim).map(|s| s.trim()).collect();

    let col = |name: &str| -> Result<usize> {
        headers
            .iter()
            .position(|&h| h == name)
            .ok_or_else(|| anyhow::anyhow!("Required column {:?} not found in header", name))
    };

    let mouse_idx = col(COL_MOUSE)?;
    let group_idx = col(COL_GROUP)?;
    let time_idx = col(COL_TIME)?;
    let region_idx = col(COL_REGION)?;
    let value_idx = col(COL_VALUE)?;
    let metric_idx = col(COL_METRIC)?;
    let max_idx = mouse_idx
        .max(group_idx)
        .max(time_idx)
        .max(region_idx)
        .max(value_idx)
        .max(metric_idx);

    let metric = metric.trim();
    let mut observations = Vec::new();
    let mut n_other_metric = 0usize;
    let mut n_dropped = 0usize;

    for (line_num, line) in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(delim).map(|s| s.trim()).collect();
        if fields.len() <= max_idx {
            bail!(
                "Line {} has too few fields (expected at least {})",
                line_num + 1,
                max_idx + 1
            );
        }

        if fields[metric_idx] != metric {
            n_other_metric += 1;
            continue;
        }

        let mouse_id = fields[mouse_idx];
        let region = fields[region_idx];
        let value = parse_value(fields[value_idx]);
        let group_raw = fields[group_idx];
        let time_raw = fields[time_idx];

        // Listwise deletion: a record missing any key field is dropped.
        if mouse_id.is_empty()
            || region.is_empty()
            || value.is_nan()
            || group_raw.is_empty()
            || time_raw.is_empty()
        {
            n_dropped += 1;
            continue;
        }

        // Non-empty labels outside the fixed level sets are a schema defect,
        // not missing data.
        let group = Group::parse_label(group_raw)
            .with_context(|| format!("Line {}", line_num + 1))?;
        let time = TimePoint::parse_label(time_raw)
            .with_context(|| format!("Line {}", line_num + 1))?;

        observations.push(Observation {
            mouse_id: mouse_id.to_string(),
            group,
            time,
            region: region.to_string(),
            value,
        });
    }

    debug!(
        "Cleaning: kept {}, filtered {} other-metric rows, dropped {} incomplete rows",
        observations.len(),
        n_other_metric,
        n_dropped
    );

    if observations.is_empty() {
        bail!("No complete observations for metric {:?}", metric);
    }

    Ok(AnalysisTable { observations })
}

/// Parse a numeric field, treating NA-style tokens as missing.
fn parse_value(s: &str) -> f64 {
    match s {
        "NA" | "na" | "Na" | "." | "" | "-" | "NaN" | "nan" => f64::NAN,
        _ => s.parse().unwrap_or(f64::NAN),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const HEADER: &str = "Mouse Name,group,time,region,value,metric";

    fn table(rows: &[&str]) -> String {
        let mut s = String::from(HEADER);
        for r in rows {
            s.push('\n');
            s.push_str(r);
        }
        s
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("0.42"), 0.42);
        assert!(parse_value("NA").is_nan());
        assert!(parse_value("").is_nan());
        assert!(parse_value("abc").is_nan());
    }

    #[test]
    fn test_parse_basic() {
        let contents = table(&[
            "M1,CONTROL,Baseline,Hippocampus,0.41,FA",
            "M1,CONTROL,Month 2,Hippocampus,0.43,FA",
            "M2,ATM+RT,Baseline,Cortex,0.38,FA",
        ]);
        let t = parse_table(&contents, "FA").unwrap();
        assert_eq!(t.len(), 3);
        assert_eq!(t.observations[0].mouse_id, "M1");
        assert_eq!(t.observations[2].group, Group::AtmRt);
        assert_eq!(t.observations[1].time, TimePoint::Month2);
        assert_eq!(t.region_levels(), vec!["Cortex", "Hippocampus"]);
        assert_eq!(t.mouse_levels(), vec!["M1", "M2"]);
    }

    #[test]
    fn test_metric_filter() {
        let contents = table(&[
            "M1,CONTROL,Baseline,Hippocampus,0.41,FA",
            "M1,CONTROL,Baseline,Hippocampus,0.0009,MD",
        ]);
        let t = parse_table(&contents, "FA").unwrap();
        assert_eq!(t.len(), 1);
        assert!((t.observations[0].value - 0.41).abs() < 1e-12);
    }

    #[test]
    fn test_metric_filter_idempotent() {
        // Re-cleaning an already-filtered table yields the same records.
        let contents = table(&[
            "M1,CONTROL,Baseline,Hippocampus,0.41,FA",
            "M2,RT,Month 4,Cortex,0.39,FA",
            "M1,CONTROL,Baseline,Hippocampus,0.0009,MD",
        ]);
        let once = parse_table(&contents, "FA").unwrap();

        let mut refiltered = String::from(HEADER);
        for o in &once.observations {
            refiltered.push_str(&format!(
                "\n{},{},{},{},{},FA",
                o.mouse_id,
                o.group.label(),
                o.time.label(),
                o.region,
                o.value
            ));
        }
        let twice = parse_table(&refiltered, "FA").unwrap();
        assert_eq!(once.observations, twice.observations);
    }

    #[test]
    fn test_label_normalization() {
        let contents = table(&["M1, atm - rt ,month 2,Hippocampus,0.41,FA"]);
        let t = parse_table(&contents, "FA").unwrap();
        assert_eq!(t.observations[0].group, Group::AtmRt);
        assert_eq!(t.observations[0].time, TimePoint::Month2);
    }

    #[test]
    fn test_drops_incomplete_rows() {
        let contents = table(&[
            "M1,CONTROL,Baseline,Hippocampus,0.41,FA",
            ",CONTROL,Baseline,Hippocampus,0.41,FA",
            "M2,RT,Month 2,Hippocampus,NA,FA",
            "M3,RT,Month 2,,0.40,FA",
        ]);
        let t = parse_table(&contents, "FA").unwrap();
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn test_cleaning_postconditions() {
        let contents = table(&[
            "M1, Control ,BASELINE,Hippocampus,0.41,FA",
            "M2,atm,month 6,Cortex,0.37,FA",
        ]);
        let t = parse_table(&contents, "FA").unwrap();
        for o in &t.observations {
            assert!(Group::ALL.contains(&o.group));
            assert!(TimePoint::ALL.contains(&o.time));
            assert!(o.value.is_finite());
            assert!(!o.region.is_empty());
        }
    }

    #[test]
    fn test_unknown_group_aborts() {
        let contents = table(&["M1,SHAM,Baseline,Hippocampus,0.41,FA"]);
        assert!(parse_table(&contents, "FA").is_err());
    }

    #[test]
    fn test_unknown_time_aborts() {
        let contents = table(&["M1,CONTROL,Week 3,Hippocampus,0.41,FA"]);
        assert!(parse_table(&contents, "FA").is_err());
    }

    #[test]
    fn test_missing_column_aborts() {
        let contents = "Mouse Name,group,time,region,value\nM1,CONTROL,Baseline,Hippocampus,0.41";
        let err = parse_table(contents, "FA").unwrap_err();
        assert!(err.to_string().contains("metric"), "{}", err);
    }

    #[test]
    fn test_no_rows_for_metric_aborts() {
        let contents = table(&["M1,CONTROL,Baseline,Hippocampus,0.0009,MD"]);
        assert!(parse_table(&contents, "FA").is_err());
    }

    #[test]
    fn test_load_table_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "{}", HEADER).unwrap();
        writeln!(f, "M1,CONTROL,Baseline,Hippocampus,0.41,FA").unwrap();

        let t = load_table(&path, "FA").unwrap();
        assert_eq!(t.len(), 1);
    }
}
