//! The one-shot analysis pipeline.
//!
//! dwistat analyze --input regional_metrics_long.csv --output results.xlsx

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use tracing::info;

use dwistat_core::infer::wald_tests;
use dwistat_core::model::fitted::{model_summary, save_model_json};
use dwistat_core::model::fit_model;
use dwistat_core::model::reml::RemlConfig;
use dwistat_core::posthoc::pairwise_contrasts;
use dwistat_core::report::write_workbook;
use dwistat_core::variance::icc_summary;
use dwistat_data::table::load_table;

#[derive(Args)]
pub struct AnalyzeArgs {
    /// Long-format metrics table (Mouse Name, group, time, region, value, metric)
    #[arg(long)]
    input: PathBuf,

    /// Output workbook path
    #[arg(long, default_value = "regional_fa_lmm_results.xlsx")]
    output: PathBuf,

    /// Metric label to analyze
    #[arg(long, default_value = "FA")]
    metric: String,

    /// Significance level for the FDR reject flag
    #[arg(long, default_value = "0.05")]
    alpha: f64,

    /// Maximum REML iterations
    #[arg(long, default_value = "50")]
    max_iter: usize,

    /// REML convergence tolerance
    #[arg(long, default_value = "1e-4")]
    tol: f64,

    /// Also save a JSON sidecar of the fitted model
    #[arg(long, default_value = "false")]
    save_json: bool,
}

pub fn run(args: AnalyzeArgs) -> Result<()> {
    info!("=== Regional DWI mixed-model analysis ===");
    info!("Input: {}", args.input.display());
    info!("Metric: {}", args.metric);

    let table = load_table(&args.input, &args.metric)?;
    info!(
        "{} observations, {} mice, {} regions",
        table.len(),
        table.mouse_levels().len(),
        table.region_levels().len()
    );

    let config = RemlConfig {
        max_iter: args.max_iter,
        tol: args.tol,
        ..Default::default()
    };
    let model = fit_model(&table, &config)?;

    let wald = wald_tests(&model)?;
    info!("{} omnibus Wald tests", wald.len());

    let contrasts = pairwise_contrasts(&table, &model.fitted_values, args.alpha)?;
    info!("{} pairwise contrasts", contrasts.len());

    let icc = icc_summary(&model)?;
    info!("ICC: {:.4}", icc.icc);

    write_workbook(&args.output, &model, &wald, &contrasts, &icc)?;

    if args.save_json {
        let json_path = args.output.with_extension("model.json");
        save_model_json(&model, &json_path)?;
        info!("JSON sidecar saved to {}", json_path.display());
    }

    println!("{}", model_summary(&model));
    println!("Results written to {}", args.output.display());

    Ok(())
}
