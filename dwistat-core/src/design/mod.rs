//! Fixed-effects design matrix construction.
//!
//! Expands the cleaned observation table into an intercept plus the full
//! three-way Group x Time x Region interaction under sum (deviation) coding:
//! each factor drops its last level, which is coded -1 across the retained
//! columns. Coefficient names follow the `Factor[S.Level]` convention.

use anyhow::{bail, Result};
use serde::Serialize;

use dwistat_data::{AnalysisTable, Group, TimePoint};
use dwistat_linalg::dense::DenseMatrix;

/// A categorical factor with a fixed, ordered level list.
#[derive(Debug, Clone)]
pub struct Factor {
    pub name: String,
    pub levels: Vec<String>,
}

impl Factor {
    /// Number of sum-coded contrast columns (levels - 1).
    pub fn n_contrasts(&self) -> usize {
        self.levels.len().saturating_sub(1)
    }

    /// Sum coding: contrast column `col` codes level `col` as +1 and the
    /// dropped last level as -1.
    pub fn code(&self, level: usize, col: usize) -> f64 {
        debug_assert!(col < self.n_contrasts());
        if level == col {
            1.0
        } else if level == self.levels.len() - 1 {
            -1.0
        } else {
            0.0
        }
    }

    /// Name of contrast column `col`, e.g. `Group[S.ATM]`.
    pub fn contrast_name(&self, col: usize) -> String {
        format!("{}[S.{}]", self.name, self.levels[col])
    }
}

/// A model term and the design columns it spans.
#[derive(Debug, Clone, Serialize)]
pub struct Term {
    pub name: String,
    pub cols: Vec<usize>,
}

/// The assembled design matrix with coefficient names and term spans.
#[derive(Debug, Clone)]
pub struct Design {
    pub x: DenseMatrix,
    pub coef_names: Vec<String>,
    pub terms: Vec<Term>,
}

impl Design {
    pub fn n_coefficients(&self) -> usize {
        self.coef_names.len()
    }
}

/// Build the sum-coded design for intercept + Group * Time * Region.
///
/// Group and Time use their fixed level sets; every level must be observed,
/// otherwise the corresponding contrast column would be degenerate. Region
/// levels come from the data (sorted).
pub fn build_design(table: &AnalysisTable) -> Result<Design> {
    let obs = &table.observations;
    let n = obs.len();

    let group_factor = Factor {
        name: "Group".to_string(),
        levels: Group::ALL.iter().map(|g| g.label().to_string()).collect(),
    };
    let time_factor = Factor {
        name: "Time".to_string(),
        levels: TimePoint::ALL.iter().map(|t| t.label().to_string()).collect(),
    };
    let region_factor = Factor {
        name: "Region".to_string(),
        levels: table.region_levels(),
    };

    for g in Group::ALL {
        if !obs.iter().any(|o| o.group == g) {
            bail!("Group level {:?} has no observations", g.label());
        }
    }
    for t in TimePoint::ALL {
        if !obs.iter().any(|o| o.time == t) {
            bail!("Time level {:?} has no observations", t.label());
        }
    }

    // Per-observation level indices.
    let group_idx: Vec<usize> = obs
        .iter()
        .map(|o| Group::ALL.iter().position(|g| *g == o.group).unwrap())
        .collect();
    let time_idx: Vec<usize> = obs
        .iter()
        .map(|o| TimePoint::ALL.iter().position(|t| *t == o.time).unwrap())
        .collect();
    let region_idx: Vec<usize> = obs
        .iter()
        .map(|o| {
            region_factor
                .levels
                .iter()
                .position(|r| *r == o.region)
                .unwrap()
        })
        .collect();

    // Per-observation contrast codes for each factor.
    let codes = |factor: &Factor, idx: &[usize]| -> Vec<Vec<f64>> {
        (0..factor.n_contrasts())
            .map(|c| idx.iter().map(|&l| factor.code(l, c)).collect())
            .collect()
    };
    let g_codes = codes(&group_factor, &group_idx);
    let t_codes = codes(&time_factor, &time_idx);
    let r_codes = codes(&region_factor, &region_idx);

    let g_names: Vec<String> = (0..g_codes.len()).map(|c| group_factor.contrast_name(c)).collect();
    let t_names: Vec<String> = (0..t_codes.len()).map(|c| time_factor.contrast_name(c)).collect();
    let r_names: Vec<String> = (0..r_codes.len()).map(|c| region_factor.contrast_name(c)).collect();

    let mut columns: Vec<Vec<f64>> = Vec::new();
    let mut coef_names: Vec<String> = Vec::new();
    let mut terms: Vec<Term> = Vec::new();

    let mut push_term =
        |name: &str, cols: Vec<(String, Vec<f64>)>, columns: &mut Vec<Vec<f64>>, coef_names: &mut Vec<String>| {
            if cols.is_empty() {
                return;
            }
            let start = columns.len();
            for (col_name, col) in cols {
                coef_names.push(col_name);
                columns.push(col);
            }
            terms.push(Term {
                name: name.to_string(),
                cols: (start..columns.len()).collect(),
            });
        };

    push_term(
        "Intercept",
        vec![("Intercept".to_string(), vec![1.0; n])],
        &mut columns,
        &mut coef_names,
    );

    let main = |names: &[String], codes: &[Vec<f64>]| -> Vec<(String, Vec<f64>)> {
        names.iter().cloned().zip(codes.iter().cloned()).collect()
    };
    push_term("Group", main(&g_names, &g_codes), &mut columns, &mut coef_names);
    push_term("Time", main(&t_names, &t_codes), &mut columns, &mut coef_names);
    push_term("Region", main(&r_names, &r_codes), &mut columns, &mut coef_names);

    let product = |a_names: &[String],
                   a_codes: &[Vec<f64>],
                   b_names: &[String],
                   b_codes: &[Vec<f64>]|
     -> Vec<(String, Vec<f64>)> {
        let mut out = Vec::new();
        for (an, ac) in a_names.iter().zip(a_codes.iter()) {
            for (bn, bc) in b_names.iter().zip(b_codes.iter()) {
                let col: Vec<f64> = ac.iter().zip(bc.iter()).map(|(x, y)| x * y).collect();
                out.push((format!("{}:{}", an, bn), col));
            }
        }
        out
    };

    push_term(
        "Group:Time",
        product(&g_names, &g_codes, &t_names, &t_codes),
        &mut columns,
        &mut coef_names,
    );
    push_term(
        "Group:Region",
        product(&g_names, &g_codes, &r_names, &r_codes),
        &mut columns,
        &mut coef_names,
    );
    push_term(
        "Time:Region",
        product(&t_names, &t_codes, &r_names, &r_codes),
        &mut columns,
        &mut coef_names,
    );

    let gt = product(&g_names, &g_codes, &t_names, &t_codes);
    let gt_names: Vec<String> = gt.iter().map(|(n, _)| n.clone()).collect();
    let gt_codes: Vec<Vec<f64>> = gt.into_iter().map(|(_, c)| c).collect();
    push_term(
        "Group:Time:Region",
        product(&gt_names, &gt_codes, &r_names, &r_codes),
        &mut columns,
        &mut coef_names,
    );

    let p = columns.len();
    let mut flat = Vec::with_capacity(n * p);
    for col in &columns {
        flat.extend_from_slice(col);
    }
    let x = DenseMatrix::from_col_major(n, p, flat);

    Ok(Design {
        x,
        coef_names,
        terms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dwistat_data::Observation;

    fn balanced_table(regions: &[&str]) -> AnalysisTable {
        let mut observations = Vec::new();
        for (gi, g) in Group::ALL.iter().enumerate() {
            for mouse in 0..2 {
                for t in TimePoint::ALL {
                    for r in regions {
                        observations.push(Observation {
                            mouse_id: format!("M{}{}", gi, mouse),
                            group: *g,
                            time: t,
                            region: r.to_string(),
                            value: 0.4,
                        });
                    }
                }
            }
        }
        AnalysisTable { observations }
    }

    #[test]
    fn test_sum_coding() {
        let f = Factor {
            name: "Group".to_string(),
            levels: vec!["A".into(), "B".into(), "C".into()],
        };
        assert_eq!(f.n_contrasts(), 2);
        assert_eq!(f.code(0, 0), 1.0);
        assert_eq!(f.code(1, 0), 0.0);
        assert_eq!(f.code(2, 0), -1.0);
        assert_eq!(f.code(2, 1), -1.0);
        assert_eq!(f.contrast_name(1), "Group[S.B]");
    }

    #[test]
    fn test_design_shape_two_regions() {
        let table = balanced_table(&["Cortex", "Hippocampus"]);
        let design = build_design(&table).unwrap();
        // 1 + 3 + 3 + 1 + 9 + 3 + 3 + 9
        assert_eq!(design.n_coefficients(), 32);
        assert_eq!(design.terms.len(), 8);
        assert_eq!(design.x.nrows(), table.len());

        let names: Vec<&str> = design.terms.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Intercept",
                "Group",
                "Time",
                "Region",
                "Group:Time",
                "Group:Region",
                "Time:Region",
                "Group:Time:Region"
            ]
        );
        let df: Vec<usize> = design.terms.iter().map(|t| t.cols.len()).collect();
        assert_eq!(df, vec![1, 3, 3, 1, 9, 3, 3, 9]);

        assert_eq!(design.coef_names[0], "Intercept");
        assert_eq!(design.coef_names[1], "Group[S.CONTROL]");
        assert!(design
            .coef_names
            .iter()
            .any(|n| n == "Group[S.CONTROL]:Time[S.Baseline]:Region[S.Cortex]"));
    }

    #[test]
    fn test_single_region_drops_region_terms() {
        let table = balanced_table(&["Cortex"]);
        let design = build_design(&table).unwrap();
        // 1 + 3 + 3 + 9, no region terms
        assert_eq!(design.n_coefficients(), 16);
        assert!(design.terms.iter().all(|t| !t.name.contains("Region")));
    }

    #[test]
    fn test_balanced_columns_sum_to_zero() {
        let table = balanced_table(&["Cortex", "Hippocampus"]);
        let design = build_design(&table).unwrap();
        for j in 1..design.n_coefficients() {
            let s: f64 = design.x.col(j).iter().sum();
            assert!(s.abs() < 1e-10, "column {} sums to {}", design.coef_names[j], s);
        }
    }

    #[test]
    fn test_missing_group_level_errors() {
        let mut table = balanced_table(&["Cortex"]);
        table.observations.retain(|o| o.group != Group::Rt);
        let err = build_design(&table).unwrap_err();
        assert!(err.to_string().contains("RT"), "{}", err);
    }
}
