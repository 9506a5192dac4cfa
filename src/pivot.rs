//src/pivot.rs

use std::ops::{Add, AddAssign};

use crate::types::{AlignmentSummary, MetricMeans};

/// Running sums of alignment metrics for one grouping key, plus the list of
/// "sites" every contribution landed on (genomic bins at strain level,
/// taxonomy ids for per-read species candidates).
///
/// `+=` is the merge: numeric fields add up, site lists concatenate. It is
/// commutative and associative up to the order of `sites`, so workers may
/// merge in any order. The grouping id (`tid`) is never summed; the left
/// operand keeps its own.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PivotAccumulator {
    pub tid: u32,
    pub quality: f64,
    pub identity: f64,
    pub gap: u64,
    pub mismatch: u64,
    pub mapq: u64,
    pub length: u64,
    pub sites: Vec<u32>,
}

impl PivotAccumulator {
    /// A single contribution from one summary record.
    pub fn from_summary(summary: &AlignmentSummary, site: u32) -> Self {
        Self {
            tid: summary.tid,
            quality: summary.quality,
            identity: summary.identity,
            gap: summary.gap as u64,
            mismatch: summary.mismatch as u64,
            mapq: summary.mapq as u64,
            length: summary.length as u64,
            sites: vec![site],
        }
    }

    /// Number of merged contributions.
    #[inline]
    pub fn count(&self) -> usize {
        self.sites.len()
    }

    /// Aligned bases that are not mismatches; the first tie-break criterion.
    #[inline]
    pub fn matched_bases(&self) -> i64 {
        self.length as i64 - self.mismatch as i64
    }

    pub fn means(&self) -> MetricMeans {
        let n = self.count();
        if n == 0 {
            return MetricMeans::default();
        }
        let n = n as f64;
        MetricMeans {
            identity: self.identity / n,
            length: self.length as f64 / n,
            mismatch: self.mismatch as f64 / n,
            gap: self.gap as f64 / n,
            quality: self.quality / n,
            mapq: self.mapq as f64 / n,
        }
    }
}

impl AddAssign<&PivotAccumulator> for PivotAccumulator {
    fn add_assign(&mut self, rhs: &PivotAccumulator) {
        self.quality += rhs.quality;
        self.identity += rhs.identity;
        self.gap += rhs.gap;
        self.mismatch += rhs.mismatch;
        self.mapq += rhs.mapq;
        self.length += rhs.length;
        self.sites.extend_from_slice(&rhs.sites);
    }
}

impl AddAssign for PivotAccumulator {
    fn add_assign(&mut self, mut rhs: PivotAccumulator) {
        self.quality += rhs.quality;
        self.identity += rhs.identity;
        self.gap += rhs.gap;
        self.mismatch += rhs.mismatch;
        self.mapq += rhs.mapq;
        self.length += rhs.length;
        self.sites.append(&mut rhs.sites);
    }
}

impl Add for PivotAccumulator {
    type Output = PivotAccumulator;

    fn add(mut self, rhs: PivotAccumulator) -> PivotAccumulator {
        self += rhs;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acc(tid: u32, quality: f64, identity: f64, n: u64, sites: &[u32]) -> PivotAccumulator {
        PivotAccumulator {
            tid,
            quality,
            identity,
            gap: n,
            mismatch: n * 2,
            mapq: n * 3,
            length: n * 50,
            sites: sites.to_vec(),
        }
    }

    fn sorted_sites(a: &PivotAccumulator) -> Vec<u32> {
        let mut s = a.sites.clone();
        s.sort_unstable();
        s
    }

    fn same_numbers(a: &PivotAccumulator, b: &PivotAccumulator) {
        assert!((a.quality - b.quality).abs() < 1e-9);
        assert!((a.identity - b.identity).abs() < 1e-9);
        assert_eq!(a.gap, b.gap);
        assert_eq!(a.mismatch, b.mismatch);
        assert_eq!(a.mapq, b.mapq);
        assert_eq!(a.length, b.length);
        assert_eq!(sorted_sites(a), sorted_sites(b));
    }

    #[test]
    fn merge_is_commutative() {
        let a = acc(7, 30.5, 91.0, 1, &[3]);
        let b = acc(7, 12.25, 88.5, 2, &[4, 4]);
        same_numbers(&(a.clone() + b.clone()), &(b + a));
    }

    #[test]
    fn merge_is_associative() {
        let a = acc(7, 30.5, 91.0, 1, &[3]);
        let b = acc(7, 12.25, 88.5, 2, &[4, 4]);
        let c = acc(7, 40.0, 99.0, 5, &[1, 9, 3]);
        let left = (a.clone() + b.clone()) + c.clone();
        let right = a + (b + c);
        same_numbers(&left, &right);
        assert_eq!(left.count(), 6);
    }

    #[test]
    fn merge_keeps_left_grouping_id() {
        let mut a = acc(7, 1.0, 1.0, 1, &[1]);
        a += &acc(9, 1.0, 1.0, 1, &[2]);
        assert_eq!(a.tid, 7);
        assert_eq!(a.sites, vec![1, 2]);
    }

    #[test]
    fn means_divide_by_contributions() {
        let a = acc(1, 60.0, 270.0, 3, &[0, 0, 1]);
        let m = a.means();
        assert_eq!(m.identity, 90.0);
        assert_eq!(m.quality, 20.0);
        assert_eq!(m.length, 50.0);
        assert_eq!(m.mapq, 3.0);
        assert_eq!(PivotAccumulator::default().means(), MetricMeans::default());
    }

    #[test]
    fn matched_bases_may_go_negative() {
        let mut a = acc(1, 0.0, 0.0, 0, &[]);
        a.length = 2;
        a.mismatch = 5;
        assert_eq!(a.matched_bases(), -3);
    }
}
