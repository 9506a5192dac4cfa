//src/diversity.rs
//
// Occupancy-weighted Shannon entropy over the bins a taxon's reads fall in.

use std::collections::BTreeMap;

/// Hits per distinct site. Ordered so the entropy sum is evaluated in the
/// same order on every run.
pub fn site_histogram(sites: &[u32]) -> BTreeMap<u32, u32> {
    let mut hist = BTreeMap::new();
    for &s in sites {
        *hist.entry(s).or_insert(0u32) += 1;
    }
    hist
}

/// Coverage weight: fraction of the taxon's bins hit at least once.
pub fn weight(sites: &[u32], total_bins: u64) -> f64 {
    if total_bins == 0 {
        return 0.0;
    }
    site_histogram(sites).len() as f64 / total_bins as f64
}

/// `|w * (ln(w) + sum(p_i * ln(p_i)))|` over the relative frequency of each
/// distinct site. With `w = 1.0` this is the conventional Shannon entropy.
pub fn shannon(sites: &[u32], weight: f64) -> f64 {
    if sites.is_empty() || weight <= 0.0 {
        return 0.0;
    }
    shannon_from_histogram(&site_histogram(sites), sites.len(), weight)
}

fn shannon_from_histogram(hist: &BTreeMap<u32, u32>, total: usize, weight: f64) -> f64 {
    let t = total as f64;
    let ws: f64 = hist
        .values()
        .map(|&c| {
            let p = c as f64 / t;
            p * p.ln()
        })
        .sum();
    (weight * (weight.ln() + ws)).abs()
}

/// Diversity of one taxon's site list, normalised by the maximum entropy
/// `ln(total_bins)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiversityIndex {
    /// Distinct sites hit.
    pub occupancy: usize,
    /// Occupancy / total bins.
    pub coverage: f64,
    /// Conventional Shannon index, normalised.
    pub shannon: f64,
    /// Weighted Shannon evenness index.
    pub wsei: f64,
    /// True when `total_bins <= 1`: there is no entropy to normalise by and
    /// both indices are reported as 0.
    pub degenerate: bool,
}

impl DiversityIndex {
    pub fn compute(sites: &[u32], total_bins: u64) -> Self {
        let occupancy = site_histogram(sites).len();
        let coverage = weight(sites, total_bins);

        let optimal = (total_bins as f64).ln();
        if sites.is_empty() || optimal <= 0.0 {
            return Self {
                occupancy,
                coverage,
                shannon: 0.0,
                wsei: 0.0,
                degenerate: true,
            };
        }

        Self {
            occupancy,
            coverage,
            shannon: shannon(sites, 1.0) / optimal,
            wsei: shannon(sites, coverage) / optimal,
            degenerate: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-12;

    #[test]
    fn uniform_occupancy_is_maximally_even() {
        let sites: Vec<u32> = (0..16).collect();
        let d = DiversityIndex::compute(&sites, 16);
        assert!((d.shannon - 1.0).abs() < EPS);
        assert!((d.wsei - 1.0).abs() < EPS);
        assert_eq!(d.coverage, 1.0);
        assert_eq!(d.occupancy, 16);
    }

    #[test]
    fn single_bin_has_zero_entropy() {
        assert!(shannon(&[5, 5, 5], 1.0).abs() < EPS);
    }

    #[test]
    fn weighted_value_uses_absolute_value() {
        // 2 reads in distinct bins out of 10: w = 0.2
        let sites = [1, 2];
        let w = weight(&sites, 10);
        assert!((w - 0.2).abs() < EPS);
        let raw = w * (w.ln() + 2.0 * (0.5f64 * 0.5f64.ln()));
        assert!(raw < 0.0);
        assert!((shannon(&sites, w) - raw.abs()).abs() < EPS);
    }

    #[test]
    fn skewed_occupancy_matches_hand_computation() {
        let d = DiversityIndex::compute(&[0, 0, 1], 2);
        assert_eq!(d.coverage, weight(&[0, 0, 1], 2));
        let h = -((2.0f64 / 3.0) * (2.0f64 / 3.0).ln() + (1.0f64 / 3.0) * (1.0f64 / 3.0).ln());
        assert!((d.shannon - h / 2.0f64.ln()).abs() < EPS);
        assert!((d.wsei - d.shannon).abs() < EPS);
        assert_eq!(d.occupancy, 2);
    }

    #[test]
    fn degenerate_inputs_never_yield_nan() {
        let one_bin = DiversityIndex::compute(&[3, 3], 1);
        assert!(one_bin.degenerate);
        assert_eq!(one_bin.wsei, 0.0);
        assert_eq!(one_bin.shannon, 0.0);

        let empty = DiversityIndex::compute(&[], 4);
        assert!(empty.degenerate);

        let huge = DiversityIndex::compute(&[0, 1], u64::from(u32::MAX) + 1);
        assert!(!huge.degenerate);
        assert!(huge.coverage > 0.0 && huge.wsei.is_finite());
        assert_eq!(weight(&[1], 0), 0.0);
        assert_eq!(shannon(&[], 1.0), 0.0);
    }
}
