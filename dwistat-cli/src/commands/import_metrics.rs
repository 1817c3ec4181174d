//! Bridge the upstream extraction output into the long analysis format.
//!
//! dwistat import-metrics --metrics-csv regional_metrics.csv \
//!     --subjects-file subjects.tsv --output regional_metrics_long.csv

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use tracing::info;

use dwistat_data::import::run_import;

#[derive(Args)]
pub struct ImportMetricsArgs {
    /// Extraction output (subject, code, region, mean_FA, mean_MD)
    #[arg(long)]
    metrics_csv: PathBuf,

    /// Subject metadata (code, group, time)
    #[arg(long)]
    subjects_file: PathBuf,

    /// Long-format output path
    #[arg(long)]
    output: PathBuf,
}

pub fn run(args: ImportMetricsArgs) -> Result<()> {
    info!("=== Import regional extraction metrics ===");

    let summary = run_import(&args.metrics_csv, &args.subjects_file, &args.output)?;

    println!(
        "Imported {} rows ({} extraction rows skipped) into {}",
        summary.rows_written,
        summary.rows_skipped,
        args.output.display()
    );

    Ok(())
}
