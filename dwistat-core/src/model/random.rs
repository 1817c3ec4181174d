//! Variance-component grouping structure.
//!
//! Each component is a partition of the observations into cells (one cell per
//! grouping level); its kernel is K = Z Z' for the cell-indicator matrix Z,
//! so K*v sums v within cells and tr(P*K) sums P over within-cell pairs.

use dwistat_data::AnalysisTable;
use dwistat_linalg::dense::DenseMatrix;

/// One grouping component (e.g. `mouse`, `mouse:time`).
#[derive(Debug, Clone)]
pub struct GroupingComponent {
    pub name: String,
    /// Level index per observation.
    pub obs_level: Vec<usize>,
    /// Observation indices per level.
    pub levels: Vec<Vec<usize>>,
}

impl GroupingComponent {
    /// Build a component from one grouping key per observation.
    pub fn from_keys(name: &str, keys: &[String]) -> Self {
        let mut sorted: Vec<String> = keys.to_vec();
        sorted.sort();
        sorted.dedup();

        let obs_level: Vec<usize> = keys
            .iter()
            .map(|k| sorted.binary_search(k).unwrap())
            .collect();
        let mut levels = vec![Vec::new(); sorted.len()];
        for (i, &l) in obs_level.iter().enumerate() {
            levels[l].push(i);
        }

        Self {
            name: name.to_string(),
            obs_level,
            levels,
        }
    }

    pub fn n_levels(&self) -> usize {
        self.levels.len()
    }

    /// K * v: within-cell sums broadcast back to members.
    pub fn kernel_vec(&self, v: &[f64]) -> Vec<f64> {
        let mut out = vec![0.0; v.len()];
        for cell in &self.levels {
            let s: f64 = cell.iter().map(|&i| v[i]).sum();
            for &i in cell {
                out[i] = s;
            }
        }
        out
    }

    /// tr(P * K) = sum of P over all within-cell index pairs.
    pub fn kernel_trace_with(&self, p: &DenseMatrix) -> f64 {
        let mut t = 0.0;
        for cell in &self.levels {
            for &i in cell {
                for &j in cell {
                    t += p.get(i, j);
                }
            }
        }
        t
    }

    /// Add sigma2 * K into the covariance matrix being assembled.
    pub fn add_kernel_scaled(&self, v: &mut DenseMatrix, sigma2: f64) {
        for cell in &self.levels {
            for &i in cell {
                for &j in cell {
                    v.add_at(i, j, sigma2);
                }
            }
        }
    }
}

/// The full random structure: an ordered list of grouping components.
#[derive(Debug, Clone)]
pub struct RandomStructure {
    pub components: Vec<GroupingComponent>,
}

/// The model's variance components: subject intercept, by-time subject
/// deviation (the random-slope structure), and subject-by-region deviation.
pub fn mouse_structure(table: &AnalysisTable) -> RandomStructure {
    let obs = &table.observations;

    let mouse_keys: Vec<String> = obs.iter().map(|o| o.mouse_id.clone()).collect();
    let mouse_time_keys: Vec<String> = obs
        .iter()
        .map(|o| format!("{}\u{1f}{}", o.mouse_id, o.time.label()))
        .collect();
    let mouse_region_keys: Vec<String> = obs
        .iter()
        .map(|o| format!("{}\u{1f}{}", o.mouse_id, o.region))
        .collect();

    RandomStructure {
        components: vec![
            GroupingComponent::from_keys("mouse", &mouse_keys),
            GroupingComponent::from_keys("mouse:time", &mouse_time_keys),
            GroupingComponent::from_keys("mouse:region", &mouse_region_keys),
        ],
    }
}
