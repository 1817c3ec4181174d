//! Post-hoc pairwise contrast engine.
//!
//! Compares Group level means of the model-predicted values within every
//! Time x Region combination, with the mouse as the repeated-measures unit
//! (one predicted value per mouse per cell, averaging if a mouse contributes
//! several records). Raw p-values come from Welch's two-sample t-test; the
//! whole family is then Benjamini-Hochberg adjusted.

pub mod fdr;

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, StudentsT};

use dwistat_data::{AnalysisTable, Group, TimePoint};

use self::fdr::benjamini_hochberg;

/// One pairwise contrast row.
#[derive(Debug, Clone, Serialize)]
pub struct PairwiseContrast {
    pub time: String,
    pub region: String,
    pub group_a: String,
    pub group_b: String,
    pub n_a: usize,
    pub n_b: usize,
    pub mean_a: f64,
    pub mean_b: f64,
    /// Mean difference (a - b).
    pub estimate: f64,
    pub t_stat: f64,
    pub df: f64,
    pub p_unc: f64,
    pub p_fdr: f64,
    pub reject: bool,
}

/// Welch's two-sample t-test. Returns (t, df, two-sided p).
pub fn welch_t_test(a: &[f64], b: &[f64]) -> Result<(f64, f64, f64)> {
    if a.len() < 2 || b.len() < 2 {
        bail!(
            "Welch t-test needs at least two values per group, got {} and {}",
            a.len(),
            b.len()
        );
    }
    let (n_a, n_b) = (a.len() as f64, b.len() as f64);
    let mean_a = a.iter().sum::<f64>() / n_a;
    let mean_b = b.iter().sum::<f64>() / n_b;
    let var_a = a.iter().map(|v| (v - mean_a) * (v - mean_a)).sum::<f64>() / (n_a - 1.0);
    let var_b = b.iter().map(|v| (v - mean_b) * (v - mean_b)).sum::<f64>() / (n_b - 1.0);

    let se2 = var_a / n_a + var_b / n_b;
    if se2 <= 0.0 {
        bail!("Zero variance in both groups, t-test is undefined");
    }
    let t = (mean_a - mean_b) / se2.sqrt();

    // Welch-Satterthwaite degrees of freedom.
    let df = se2 * se2
        / ((var_a / n_a) * (var_a / n_a) / (n_a - 1.0)
            + (var_b / n_b) * (var_b / n_b) / (n_b - 1.0));

    let dist = StudentsT::new(0.0, 1.0, df)
        .map_err(|e| anyhow::anyhow!("Invalid t distribution (df={}): {}", df, e))?;
    let p = 2.0 * (1.0 - dist.cdf(t.abs()));
    Ok((t, df, p))
}

fn round4(x: f64) -> f64 {
    (x * 1e4).round() / 1e4
}

/// All pairwise Group contrasts within each Time x Region cell, over the
/// model-predicted values, FDR-adjusted across the whole family.
pub fn pairwise_contrasts(
    table: &AnalysisTable,
    fitted_values: &[f64],
    alpha: f64,
) -> Result<Vec<PairwiseContrast>> {
    assert_eq!(table.len(), fitted_values.len());

    // (time, region) -> group -> mouse -> predicted values
    type MouseValues = BTreeMap<String, Vec<f64>>;
    let mut cells: BTreeMap<(TimePoint, String), BTreeMap<Group, MouseValues>> = BTreeMap::new();
    for (obs, &fv) in table.observations.iter().zip(fitted_values.iter()) {
        cells
            .entry((obs.time, obs.region.clone()))
            .or_default()
            .entry(obs.group)
            .or_default()
            .entry(obs.mouse_id.clone())
            .or_default()
            .push(fv);
    }

    struct RawContrast {
        time: TimePoint,
        region: String,
        group_a: Group,
        group_b: Group,
        n_a: usize,
        n_b: usize,
        mean_a: f64,
        mean_b: f64,
        t: f64,
        df: f64,
        p: f64,
    }

    let mut raw = Vec::new();
    for ((time, region), groups) in &cells {
        // One value per mouse: average a mouse's records within the cell.
        let per_mouse = |g: Group| -> Result<Vec<f64>> {
            let mice = match groups.get(&g) {
                Some(m) => m,
                None => bail!(
                    "Group {:?} has no observations in cell ({}, {})",
                    g.label(),
                    time.label(),
                    region
                ),
            };
            Ok(mice
                .values()
                .map(|vs| vs.iter().sum::<f64>() / vs.len() as f64)
                .collect())
        };

        for (i, &ga) in Group::ALL.iter().enumerate() {
            for &gb in &Group::ALL[i + 1..] {
                let a = per_mouse(ga)?;
                let b = per_mouse(gb)?;
                let (t, df, p) = welch_t_test(&a, &b).map_err(|e| {
                    anyhow::anyhow!(
                        "Contrast {} vs {} in cell ({}, {}): {}",
                        ga.label(),
                        gb.label(),
                        time.label(),
                        region,
                        e
                    )
                })?;
                let mean_a = a.iter().sum::<f64>() / a.len() as f64;
                let mean_b = b.iter().sum::<f64>() / b.len() as f64;
                raw.push(RawContrast {
                    time: *time,
                    region: region.clone(),
                    group_a: ga,
                    group_b: gb,
                    n_a: a.len(),
                    n_b: b.len(),
                    mean_a,
                    mean_b,
                    t,
                    df,
                    p,
                });
            }
        }
    }

    let p_values: Vec<f64> = raw.iter().map(|c| c.p).collect();
    let adjusted = benjamini_hochberg(&p_values);

    Ok(raw
        .into_iter()
        .zip(adjusted)
        .map(|(c, p_fdr)| PairwiseContrast {
            time: c.time.label().to_string(),
            region: c.region,
            group_a: c.group_a.label().to_string(),
            group_b: c.group_b.label().to_string(),
            n_a: c.n_a,
            n_b: c.n_b,
            mean_a: round4(c.mean_a),
            mean_b: round4(c.mean_b),
            estimate: round4(c.mean_a - c.mean_b),
            t_stat: round4(c.t),
            df: round4(c.df),
            p_unc: round4(c.p),
            p_fdr: round4(p_fdr),
            reject: p_fdr <= alpha,
        })
        .collect())
}
