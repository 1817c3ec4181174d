//! dwistat: statistical analysis of longitudinal regional DWI metrics.
//!
//! CLI entry point using clap for argument parsing.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "dwistat",
    version,
    about = "Mixed-model analysis of longitudinal regional DWI metrics",
    long_about = "Fits a linear mixed-effects model (Group x Time x Region with mouse-level \n\
                   variance components) to long-format regional DWI measurements.\n\
                   Exports fixed effects, Wald tests, pairwise contrasts, and ICC to a \n\
                   multi-sheet workbook."
)]
struct Cli {
    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full analysis pipeline and write the results workbook
    Analyze(commands::analyze::AnalyzeArgs),

    /// Convert the regional extraction CSV into the long analysis format
    ImportMetrics(commands::import_metrics::ImportMetricsArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    tracing::info!("dwistat v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Analyze(args) => commands::analyze::run(args),
        Commands::ImportMetrics(args) => commands::import_metrics::run(args),
    }
}
