//! Benjamini-Hochberg false-discovery-rate adjustment.

/// Adjust a family of p-values with the Benjamini-Hochberg step-up
/// procedure. Returns adjusted p-values in the input order; every adjusted
/// value is >= its raw value and <= 1.
pub fn benjamini_hochberg(p_values: &[f64]) -> Vec<f64> {
    let m = p_values.len();
    if m == 0 {
        return Vec::new();
    }

    let mut order: Vec<usize> = (0..m).collect();
    order.sort_by(|&a, &b| p_values[a].partial_cmp(&p_values[b]).unwrap());

    // p_(k) * m / k, then a cumulative minimum from the largest rank down.
    let mut adjusted_sorted = vec![0.0; m];
    let mut running_min = 1.0f64;
    for rank in (0..m).rev() {
        let scaled = p_values[order[rank]] * m as f64 / (rank + 1) as f64;
        running_min = running_min.min(scaled);
        adjusted_sorted[rank] = running_min.min(1.0);
    }

    let mut adjusted = vec![0.0; m];
    for (rank, &idx) in order.iter().enumerate() {
        adjusted[idx] = adjusted_sorted[rank];
    }
    adjusted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        assert!(benjamini_hochberg(&[]).is_empty());
    }

    #[test]
    fn test_single_value_unchanged() {
        let adj = benjamini_hochberg(&[0.03]);
        assert!((adj[0] - 0.03).abs() < 1e-12);
    }

    #[test]
    fn test_known_family() {
        // Hand-computed: p = [0.01, 0.04, 0.03, 0.005], m = 4.
        // sorted: 0.005*4/1=0.02, 0.01*4/2=0.02, 0.03*4/3=0.04, 0.04*4/4=0.04
        let adj = benjamini_hochberg(&[0.01, 0.04, 0.03, 0.005]);
        assert!((adj[3] - 0.02).abs() < 1e-12);
        assert!((adj[0] - 0.02).abs() < 1e-12);
        assert!((adj[2] - 0.04).abs() < 1e-12);
        assert!((adj[1] - 0.04).abs() < 1e-12);
    }

    #[test]
    fn test_adjusted_at_least_raw() {
        let p = [0.001, 0.2, 0.05, 0.9, 0.04, 0.04];
        let adj = benjamini_hochberg(&p);
        for (raw, a) in p.iter().zip(adj.iter()) {
            assert!(a >= raw, "adjusted {} < raw {}", a, raw);
            assert!(*a <= 1.0);
        }
    }

    #[test]
    fn test_monotone_in_rank() {
        let p = [0.5, 0.01, 0.3, 0.02];
        let adj = benjamini_hochberg(&p);
        // Sorting both keeps order relationships intact.
        let mut pairs: Vec<(f64, f64)> = p.iter().cloned().zip(adj.iter().cloned()).collect();
        pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
        for w in pairs.windows(2) {
            assert!(w[0].1 <= w[1].1 + 1e-12);
        }
    }
}
