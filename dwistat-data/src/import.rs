//! Wide-to-long bridge for the upstream regional extraction output.
//!
//! The atlas-warping batch job emits one row per subject/region with
//! `mean_FA`/`mean_MD` columns but no grouping variables. This module joins
//! those rows against a subject metadata table (code -> group, time) and
//! writes the long-format file the analysis pipeline reads.

use std::collections::HashMap;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use crate::categories::{Group, TimePoint};

/// Counts reported after an import run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    /// Long-format rows written (two per extraction row).
    pub rows_written: usize,
    /// Extraction rows skipped for lack of subject metadata.
    pub rows_skipped: usize,
}

/// Subject metadata: code -> (group, time), parsed from a small delimited
/// file with header `code`, `group`, `time`.
pub fn parse_subject_metadata(path: &Path) -> Result<HashMap<String, (Group, TimePoint)>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read subject metadata: {}", path.display()))?;

    let mut lines = contents.lines().enumerate();
    let (_, header_line) = lines
        .next()
        .ok_or_else(|| anyhow::anyhow!("Empty subject metadata file"))?;
    let delim = if header_line.contains('\t') { '\t' } else { ',' };
    let headers: Vec<&str> = header_line.split(delim).map(|s| s.trim()).collect();

    let col = |name: &str| -> Result<usize> {
        headers
            .iter()
            .position(|&h| h == name)
            .ok_or_else(|| anyhow::anyhow!("Required column {:?} not found in header", name))
    };
    let code_idx = col("code")?;
    let group_idx = col("group")?;
    let time_idx = col("time")?;
    let max_idx = code_idx.max(group_idx).max(time_idx);

    let mut metadata = HashMap::new();
    for (line_num, line) in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(delim).map(|s| s.trim()).collect();
        if fields.len() <= max_idx {
            bail!("Line {} has too few fields", line_num + 1);
        }
        let group = Group::parse_label(fields[group_idx])
            .with_context(|| format!("Line {}", line_num + 1))?;
        let time = TimePoint::parse_label(fields[time_idx])
            .with_context(|| format!("Line {}", line_num + 1))?;
        metadata.insert(fields[code_idx].to_string(), (group, time));
    }

    if metadata.is_empty() {
        bail!("Subject metadata file has no entries");
    }
    Ok(metadata)
}

/// Convert the extraction CSV (`subject,code,region,mean_FA,mean_MD`) into
/// the long-format analysis input, joining grouping variables on `code`.
/// Subjects without metadata are skipped and counted.
pub fn run_import(metrics_path: &Path, subjects_path: &Path, out_path: &Path) -> Result<ImportSummary> {
    let metadata = parse_subject_metadata(subjects_path)?;
    info!("Loaded metadata for {} subjects", metadata.len());

    let contents = std::fs::read_to_string(metrics_path)
        .with_context(|| format!("Failed to read extraction output: {}", metrics_path.display()))?;

    let mut lines = contents.lines().enumerate();
    let (_, header_line) = lines
        .next()
        .ok_or_else(|| anyhow::anyhow!("Empty extraction file"))?;
    let delim = if header_line.contains('\t') { '\t' } else { ',' };
    let headers: Vec<&str> = header_line.split(delim).map(|s| s.trim()).collect();

    let col = |name: &str| -> Result<usize> {
        headers
            .iter()
            .position(|&h| h == name)
            .ok_or_else(|| anyhow::anyhow!("Required column {:?} not found in header", name))
    };
    let code_idx = col("code")?;
    let region_idx = col("region")?;
    let fa_idx = col("mean_FA")?;
    let md_idx = col("mean_MD")?;
    let max_idx = code_idx.max(region_idx).max(fa_idx).max(md_idx);

    let out_file = std::fs::File::create(out_path)
        .with_context(|| format!("Failed to create output file: {}", out_path.display()))?;
    let mut writer = BufWriter::new(out_file);
    writeln!(writer, "Mouse Name,group,time,region,value,metric")?;

    let mut rows_written = 0usize;
    let mut rows_skipped = 0usize;

    for (line_num, line) in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(delim).map(|s| s.trim()).collect();
        if fields.len() <= max_idx {
            bail!("Line {} has too few fields", line_num + 1);
        }

        let code = fields[code_idx];
        let (group, time) = match metadata.get(code) {
            Some(&m) => m,
            None => {
                warn!("No metadata for subject code {:?}, skipping", code);
                rows_skipped += 1;
                continue;
            }
        };

        for (metric, value) in [("FA", fields[fa_idx]), ("MD", fields[md_idx])] {
            writeln!(
                writer,
                "{},{},{},{},{},{}",
                code,
                group.label(),
                time.label(),
                fields[region_idx],
                value,
                metric
            )?;
            rows_written += 1;
        }
    }

    writer.flush()?;
    info!(
        "Import complete: {} rows written, {} extraction rows skipped",
        rows_written, rows_skipped
    );

    Ok(ImportSummary {
        rows_written,
        rows_skipped,
    })
}
