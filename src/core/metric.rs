//! core/metric.rs — Phase-lag metrics reduced from accumulated CSD sums.
//!
//! With S = Σ Im(CSD), A = Σ |Im(CSD)|, Q = Σ Im(CSD)² over trials:
//!
//!   dSWPLI = (S² − Q) / (A² − Q)     (0 when A² − Q == 0)
//!   WPLI   = |S| / A                 (0 when A == 0)
//!
//! Subtracting Q removes the n-trial self-products that bias the squared
//! WPLI upward. A zero denominator (one trial, or purely real CSD) maps to
//! exactly 0 instead of NaN.

use serde::{Deserialize, Serialize};

use crate::core::accumulator::{AccumulatedSums, AccumulatorEntry};

/// A connectivity statistic computable from `AccumulatorEntry` sums.
pub trait CsdReduction {
    /// Value for one (pair, bin) cell after `n_trials` merges.
    fn reduce_entry(&self, entry: &AccumulatorEntry, n_trials: usize) -> f64;

    /// One pass over the grid: rows × bins.
    fn reduce(&self, sums: &AccumulatedSums) -> Vec<Vec<f64>> {
        let n_trials = sums.n_trials();
        (0..sums.n_rows())
            .map(|row| {
                sums.row(row)
                    .iter()
                    .map(|e| self.reduce_entry(e, n_trials))
                    .collect()
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Metric {
    /// Debiased squared weighted phase-lag index.
    #[default]
    DebiasedSquaredWpli,
    /// Weighted phase-lag index.
    Wpli,
}

impl Metric {
    pub const ALL: [Metric; 2] = [Metric::DebiasedSquaredWpli, Metric::Wpli];

    pub fn name(self) -> &'static str {
        match self {
            Metric::DebiasedSquaredWpli => "dswpli",
            Metric::Wpli => "wpli",
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl CsdReduction for Metric {
    #[inline]
    fn reduce_entry(&self, entry: &AccumulatorEntry, _n_trials: usize) -> f64 {
        match self {
            Metric::DebiasedSquaredWpli => debiased_squared_wpli(entry),
            Metric::Wpli => wpli(entry),
        }
    }
}

#[inline]
pub fn debiased_squared_wpli(entry: &AccumulatorEntry) -> f64 {
    let s = entry.imag_sum();
    let a = entry.imag_abs_sum;
    let q = entry.imag_sqrd_sum;
    let numerator = s * s - q;
    let denominator = a * a - q;
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

#[inline]
pub fn wpli(entry: &AccumulatorEntry) -> f64 {
    let a = entry.imag_abs_sum;
    if a == 0.0 {
        0.0
    } else {
        entry.imag_sum().abs() / a
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{Rng, SeedableRng};
    use rustfft::num_complex::Complex64;

    fn entry_from(csds: &[Complex64]) -> AccumulatorEntry {
        let mut e = AccumulatorEntry::default();
        for &z in csds {
            e.add(z);
        }
        e
    }

    #[test]
    fn single_trial_is_exactly_zero() {
        for z in [
            Complex64::new(0.3, 0.8),
            Complex64::new(-2.0, -1e-7),
            Complex64::new(5.0, 123.456),
        ] {
            let e = entry_from(&[z]);
            assert_eq!(debiased_squared_wpli(&e), 0.0);
        }
    }

    #[test]
    fn real_csd_is_exactly_zero() {
        let e = entry_from(&[
            Complex64::new(1.0, 0.0),
            Complex64::new(-3.0, 0.0),
            Complex64::new(0.5, 0.0),
        ]);
        assert_eq!(debiased_squared_wpli(&e), 0.0);
        assert_eq!(wpli(&e), 0.0);
        assert_eq!(debiased_squared_wpli(&AccumulatorEntry::default()), 0.0);
    }

    #[test]
    fn consistent_lag_sign_gives_one() {
        let e = entry_from(&[
            Complex64::new(0.2, 0.5),
            Complex64::new(-1.0, 2.0),
            Complex64::new(3.0, 0.1),
        ]);
        assert_relative_eq!(debiased_squared_wpli(&e), 1.0, epsilon = 1e-12);
        assert_relative_eq!(wpli(&e), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn matches_pairwise_product_form() {
        // (S² − Q)/(A² − Q) = Σ_{i≠j} Im_i Im_j / Σ_{i≠j} |Im_i||Im_j|
        let ims = [0.4, -0.1, 0.7, 0.3, -0.2];
        let csds: Vec<Complex64> = ims.iter().map(|&im| Complex64::new(1.0, im)).collect();
        let e = entry_from(&csds);
        let mut num = 0.0;
        let mut den = 0.0;
        for (i, a) in ims.iter().enumerate() {
            for (j, b) in ims.iter().enumerate() {
                if i != j {
                    num += a * b;
                    den += f64::abs(*a) * f64::abs(*b);
                }
            }
        }
        assert_relative_eq!(debiased_squared_wpli(&e), num / den, epsilon = 1e-12);
    }

    #[test]
    fn values_never_exceed_one_and_stay_finite() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let n = rng.random_range(1..12);
            let csds: Vec<Complex64> = (0..n)
                .map(|_| Complex64::new(rng.random_range(-1.0..1.0), rng.random_range(-1.0..1.0)))
                .collect();
            let e = entry_from(&csds);
            let v = debiased_squared_wpli(&e);
            assert!(v.is_finite());
            assert!(v <= 1.0 + 1e-9 && v >= -1.0 - 1e-9, "v={v}");
            let w = wpli(&e);
            assert!((0.0..=1.0 + 1e-9).contains(&w), "w={w}");
        }
    }

    #[test]
    fn reduce_walks_rows_and_bins() {
        let mut sums = AccumulatedSums::new(2, 3);
        assert_eq!(Metric::DebiasedSquaredWpli.reduce(&sums), vec![vec![0.0; 3]; 2]);
        assert_eq!(sums.n_trials(), 0);
        // Empty accumulator still reduces to zeros for every metric.
        for metric in Metric::ALL {
            let out = metric.reduce(&sums);
            assert_eq!(out.len(), 2);
            assert!(out.iter().all(|row| row.len() == 3 && row.iter().all(|&v| v == 0.0)));
        }
        sums = AccumulatedSums::new(1, 1);
        assert_eq!(Metric::Wpli.reduce(&sums), vec![vec![0.0]]);
    }

    #[test]
    fn metric_names_round_trip_through_serde() {
        assert_eq!(Metric::DebiasedSquaredWpli.to_string(), "dswpli");
        let parsed: Metric = serde_json::from_str("\"debiased-squared-wpli\"").unwrap();
        assert_eq!(parsed, Metric::DebiasedSquaredWpli);
        let parsed: Metric = serde_json::from_str("\"wpli\"").unwrap();
        assert_eq!(parsed, Metric::Wpli);
    }
}
