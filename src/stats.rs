use std::collections::BTreeMap;
use std::fmt;

use crate::{printlnwarn, T_UNIT};

/// Nearest-rank percentile of an ascending slice.
///
/// `index = floor(p / 100 * (n - 1))`, no interpolation. `p` is clamped to
/// `[0, 100]`. Returns `None` for an empty slice.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let p = p.clamp(0.0, 100.0);
    let index = ((p / 100.0) * (sorted.len() - 1) as f64) as usize;
    sorted.get(index).copied()
}

/// Sort ascending. NaN never occurs in practice; `total_cmp` keeps it total.
pub fn sort_latencies(values: &mut [f64]) {
    values.sort_unstable_by(f64::total_cmp);
}

/// p50/p95/p99 of one run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Percentiles {
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Per-batch latencies in nanoseconds, always sorted ascending.
#[derive(Debug, Clone, PartialEq)]
pub struct LatencySamples(Vec<f64>);

impl LatencySamples {
    pub fn from_unsorted(mut values: Vec<f64>) -> Self {
        sort_latencies(&mut values);
        Self(values)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn percentile(&self, p: f64) -> Option<f64> {
        percentile(&self.0, p)
    }

    pub fn percentiles(&self) -> Option<Percentiles> {
        Some(Percentiles {
            p50: self.percentile(50.0)?,
            p95: self.percentile(95.0)?,
            p99: self.percentile(99.0)?,
        })
    }

    pub fn min(&self) -> Option<f64> {
        self.0.first().copied()
    }

    pub fn max(&self) -> Option<f64> {
        self.0.last().copied()
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.0
    }
}

pub struct Stats {
    pub min: f64,
    pub p_25: f64,
    pub median: f64,
    pub p_75: f64,
    pub max: f64,
    pub mode: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl fmt::Debug for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Stats")?;
        writeln!(f, "    min:     {:.3}", self.min)?;
        writeln!(f, "    p_25:    {:.3}", self.p_25)?;
        writeln!(f, "    median:  {:.3}", self.median)?;
        writeln!(f, "    p_75:    {:.3}", self.p_75)?;
        writeln!(f, "    max:     {:.3}", self.max)?;
        writeln!(f, "    mode:    {:.3}", self.mode)?;
        writeln!(f, "    mean:    {:.3}", self.mean)?;
        write!(f, "    std_dev: {:.3}", self.std_dev)
    }
}

/// Summary statistics of a set of trial results.
pub fn calculate_stats(values: &[f64]) -> Option<Stats> {
    if values.is_empty() {
        return None;
    }
    let len = values.len() as f64;
    let mean = values.iter().sum::<f64>() / len;

    let mut sorted = values.to_vec();
    sort_latencies(&mut sorted);

    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / len;

    // Mode over 0.01-unit buckets; ties go to the smallest bucket.
    let mut buckets: BTreeMap<i64, usize> = BTreeMap::new();
    for v in values {
        *buckets.entry((v * 100.0) as i64).or_insert(0) += 1;
    }
    let mut mode_key = 0;
    let mut mode_count = 0;
    for (&key, &count) in &buckets {
        if count > mode_count {
            mode_key = key;
            mode_count = count;
        }
    }

    Some(Stats {
        min: sorted[0],
        p_25: percentile(&sorted, 25.0)?,
        median: percentile(&sorted, 50.0)?,
        p_75: percentile(&sorted, 75.0)?,
        max: sorted[sorted.len() - 1],
        mode: mode_key as f64 / 100.0,
        mean,
        std_dev: var.sqrt(),
    })
}

/// Warn when the extremes stray more than `10 * ratio` percent from the
/// mean. Returns whether the spread was acceptable.
pub fn check_spread(label: &str, values: &[f64], ratio: u64) -> bool {
    if values.is_empty() {
        return true;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let max = values.iter().copied().fold(f64::MIN, f64::max);
    let min = values.iter().copied().fold(f64::MAX, f64::min);
    let err = (mean * 10.0 * ratio as f64) / 100.0;
    if max - mean > err || mean - min > err {
        printlnwarn!(
            "{} diff is too big: {:.3} ({:.3} - {:.3}) {}",
            label,
            max - min,
            max,
            min,
            T_UNIT
        );
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_to_hundred() -> Vec<f64> {
        (1..=100).map(|v| v as f64).collect()
    }

    #[test]
    fn nearest_rank_on_one_to_hundred() {
        let s = one_to_hundred();
        assert_eq!(percentile(&s, 50.0), Some(50.0));
        assert_eq!(percentile(&s, 95.0), Some(95.0));
        assert_eq!(percentile(&s, 99.0), Some(99.0));
        assert_eq!(percentile(&s, 0.0), Some(1.0));
        assert_eq!(percentile(&s, 100.0), Some(100.0));
    }

    #[test]
    fn truncating_index_formula() {
        let s: Vec<f64> = (0..7).map(|v| v as f64 * 1.5).collect();
        for p in 0..=100 {
            let p = p as f64;
            let idx = ((p / 100.0) * 6.0) as usize;
            assert_eq!(percentile(&s, p), Some(s[idx]), "p = {}", p);
        }
    }

    #[test]
    fn percentile_is_idempotent() {
        let s = one_to_hundred();
        assert_eq!(percentile(&s, 37.5), percentile(&s, 37.5));
    }

    #[test]
    fn single_sample_and_empty() {
        assert_eq!(percentile(&[4.2], 99.0), Some(4.2));
        assert_eq!(percentile(&[], 50.0), None);
    }

    #[test]
    fn out_of_range_p_is_clamped() {
        let s = one_to_hundred();
        assert_eq!(percentile(&s, -3.0), Some(1.0));
        assert_eq!(percentile(&s, 250.0), Some(100.0));
    }

    #[test]
    fn samples_are_sorted_and_ordered() {
        let samples = LatencySamples::from_unsorted(vec![9.0, 1.0, 5.0, 3.0, 7.0]);
        assert_eq!(samples.as_slice(), &[1.0, 3.0, 5.0, 7.0, 9.0]);
        let p = samples.percentiles().unwrap();
        assert!(p.p50 <= p.p95 && p.p95 <= p.p99);
        assert_eq!(samples.min(), Some(1.0));
        assert_eq!(samples.max(), Some(9.0));
    }

    #[test]
    fn stats_of_known_set() {
        let stats = calculate_stats(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(stats.mean, 5.0);
        assert_eq!(stats.std_dev, 2.0);
        assert_eq!(stats.mode, 4.0);
        assert_eq!(stats.min, 2.0);
        assert_eq!(stats.max, 9.0);
        assert_eq!(stats.median, 4.0);
        assert!(calculate_stats(&[]).is_none());
    }

    #[test]
    fn spread_check() {
        assert!(check_spread("flat", &[10.0, 10.0, 10.0], 1));
        assert!(!check_spread("wide", &[1.0, 10.0, 19.0], 1));
    }
}
