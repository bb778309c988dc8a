//! Running cross-spectral sums shared by all trial workers.
//!
//! The grid is sized from the pair list before dispatch and never resized.
//! `merge` is the only mutation; it holds the lock for the additions only.

use std::sync::Mutex;

use rustfft::num_complex::Complex64;

use crate::core::csd::TrialCsd;
use crate::error::{ConnectivityError, Result};

/// Sums for one (pair, bin) cell.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AccumulatorEntry {
    /// Σ CSD
    pub csd_sum: Complex64,
    /// Σ |Im CSD|
    pub imag_abs_sum: f64,
    /// Σ Im(CSD)²
    pub imag_sqrd_sum: f64,
}

impl AccumulatorEntry {
    #[inline]
    pub fn add(&mut self, csd: Complex64) {
        self.csd_sum += csd;
        self.imag_abs_sum += csd.im.abs();
        self.imag_sqrd_sum += csd.im * csd.im;
    }

    /// Σ Im(CSD)
    #[inline]
    pub fn imag_sum(&self) -> f64 {
        self.csd_sum.im
    }
}

/// Finalized sums, rows × bins, plus the number of merged trials.
#[derive(Clone, Debug, PartialEq)]
pub struct AccumulatedSums {
    n_rows: usize,
    n_bins: usize,
    n_trials: usize,
    entries: Vec<AccumulatorEntry>,
}

impl AccumulatedSums {
    pub fn new(n_rows: usize, n_bins: usize) -> Self {
        Self {
            n_rows,
            n_bins,
            n_trials: 0,
            entries: vec![AccumulatorEntry::default(); n_rows * n_bins],
        }
    }

    #[inline]
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    #[inline]
    pub fn n_bins(&self) -> usize {
        self.n_bins
    }

    #[inline]
    pub fn n_trials(&self) -> usize {
        self.n_trials
    }

    #[inline]
    pub fn row(&self, row: usize) -> &[AccumulatorEntry] {
        &self.entries[row * self.n_bins..(row + 1) * self.n_bins]
    }

    /// Add one trial's CSD to every cell.
    pub fn add_trial(&mut self, csd: &TrialCsd) {
        debug_assert_eq!(csd.n_bins(), self.n_bins);
        debug_assert_eq!(csd.n_rows(), self.n_rows);
        for row in 0..self.n_rows {
            let cells = &mut self.entries[row * self.n_bins..(row + 1) * self.n_bins];
            for (cell, &z) in cells.iter_mut().zip(csd.row(row)) {
                cell.add(z);
            }
        }
        self.n_trials += 1;
    }
}

/// Thread-safe wrapper: one exclusive region per merged trial.
#[derive(Debug)]
pub struct AccumulationState {
    inner: Mutex<AccumulatedSums>,
}

impl AccumulationState {
    pub fn new(n_rows: usize, n_bins: usize) -> Self {
        Self {
            inner: Mutex::new(AccumulatedSums::new(n_rows, n_bins)),
        }
    }

    /// Fold one trial into the running sums.
    pub fn merge(&self, csd: &TrialCsd) -> Result<()> {
        let mut sums = self
            .inner
            .lock()
            .map_err(|_| ConnectivityError::AccumulatorPoisoned)?;
        sums.add_trial(csd);
        Ok(())
    }

    /// Trials merged so far.
    pub fn merged(&self) -> Result<usize> {
        self.inner
            .lock()
            .map(|sums| sums.n_trials())
            .map_err(|_| ConnectivityError::AccumulatorPoisoned)
    }

    /// Consume the state once every worker has finished.
    pub fn into_sums(self) -> Result<AccumulatedSums> {
        self.inner
            .into_inner()
            .map_err(|_| ConnectivityError::AccumulatorPoisoned)
    }
}
