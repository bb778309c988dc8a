//! core/csd.rs — Multitaper cross-spectral density for one trial.
//!
//! For tapers w_t with weights λ_t and half spectra X_t = FFT(w_t · x):
//!
//!   CSD_ij[k] = s_k · Σ_t λ_t conj(X_i,t[k]) X_j,t[k] / Σ_t λ_t
//!
//! where s_k is the one-sided factor (1 at DC/Nyquist, 2 elsewhere).
//! Only i < j is computed; CSD_ji = conj(CSD_ij).

use std::sync::Arc;

use rustfft::{Fft, num_complex::Complex64};

use crate::core::fft::{TaperedFft, n_bins, one_sided_scale};
use crate::core::pairs::ChannelPairs;
use crate::core::taper::TaperSet;
use crate::core::trial::Trial;

/// Tapered half spectra of the channels a trial needs.
///
/// Layout per channel: `n_tapers` consecutive runs of `n_bins` values.
#[derive(Debug, Clone)]
pub struct TrialSpectra {
    n_bins: usize,
    n_tapers: usize,
    channels: Vec<Option<Vec<Complex64>>>,
}

impl TrialSpectra {
    #[inline]
    pub fn n_bins(&self) -> usize {
        self.n_bins
    }

    #[inline]
    pub fn n_tapers(&self) -> usize {
        self.n_tapers
    }

    /// Spectrum of `channel` under taper `taper`, if it was computed.
    pub fn taper_spectrum(&self, channel: usize, taper: usize) -> Option<&[Complex64]> {
        let spectrum = self.channels.get(channel)?.as_ref()?;
        let start = taper * self.n_bins;
        spectrum.get(start..start + self.n_bins)
    }
}

/// CSD of one trial for every row of a `ChannelPairs` list (rows × bins).
#[derive(Debug, Clone, PartialEq)]
pub struct TrialCsd {
    n_bins: usize,
    values: Vec<Complex64>,
}

impl TrialCsd {
    #[inline]
    pub fn n_bins(&self) -> usize {
        self.n_bins
    }

    #[inline]
    pub fn n_rows(&self) -> usize {
        if self.n_bins == 0 {
            0
        } else {
            self.values.len() / self.n_bins
        }
    }

    #[inline]
    pub fn row(&self, row: usize) -> &[Complex64] {
        &self.values[row * self.n_bins..(row + 1) * self.n_bins]
    }

    /// CSD from `a` to `b`; the reversed orientation is the conjugate.
    pub fn between(&self, pairs: &ChannelPairs, a: usize, b: usize) -> Option<Vec<Complex64>> {
        let row = self.row(pairs.row_of(a, b)?);
        if a < b {
            Some(row.to_vec())
        } else {
            Some(row.iter().map(|z| z.conj()).collect())
        }
    }
}

/// Per-worker multitaper estimator. The taper set and FFT plan are shared;
/// FFT buffers are owned.
pub struct TrialSpectralEstimator {
    tapers: Arc<TaperSet>,
    fft: TaperedFft,
    /// s_k / Σλ per bin.
    bin_scale: Vec<f64>,
    /// Applied to every sample before tapering.
    input_gain: f64,
}

impl TrialSpectralEstimator {
    /// `plan` must be a forward plan of length `tapers.n_fft()`.
    pub fn new(tapers: Arc<TaperSet>, plan: Arc<dyn Fft<f64>>) -> Self {
        let fft = TaperedFft::with_plan(plan);
        debug_assert_eq!(fft.n_fft, tapers.n_fft());
        let n_fft = fft.n_fft;
        let inv_weight = 1.0 / tapers.weight_sum();
        let bin_scale = (0..n_bins(n_fft))
            .map(|k| one_sided_scale(k, n_fft) * inv_weight)
            .collect();
        Self {
            tapers,
            fft,
            bin_scale,
            input_gain: 1.0,
        }
    }

    /// Scale samples by `gain` before the FFT. Every estimator of one
    /// invocation must use the same gain.
    pub fn with_input_gain(mut self, gain: f64) -> Self {
        self.input_gain = gain;
        self
    }

    #[inline]
    pub fn n_bins(&self) -> usize {
        self.bin_scale.len()
    }

    pub fn tapers(&self) -> &TaperSet {
        &self.tapers
    }

    /// Half spectra of `samples` under every taper, taper-major.
    pub fn tapered_spectra(&mut self, samples: &[f64]) -> Vec<Complex64> {
        let nb = self.n_bins();
        let mut out = vec![Complex64::new(0.0, 0.0); nb * self.tapers.len()];
        for (chunk, (window, _)) in out.chunks_exact_mut(nb).zip(self.tapers.iter()) {
            self.fft.half_spectrum(samples, self.input_gain, window, chunk);
        }
        out
    }

    /// Tapered spectra for each channel flagged in `channels`.
    pub fn spectra(&mut self, trial: &Trial, channels: &[bool]) -> TrialSpectra {
        let computed = (0..trial.n_channels())
            .map(|ch| {
                channels
                    .get(ch)
                    .copied()
                    .unwrap_or(false)
                    .then(|| self.tapered_spectra(trial.channel(ch)))
            })
            .collect();
        TrialSpectra {
            n_bins: self.n_bins(),
            n_tapers: self.tapers.len(),
            channels: computed,
        }
    }

    /// CSD from `seed` to each of `targets`, one vector of bins per target.
    ///
    /// # Panics
    /// If `seed` or a target was not included in `spectra`.
    pub fn cross_spectra(
        &self,
        spectra: &TrialSpectra,
        seed: usize,
        targets: &[usize],
    ) -> Vec<Vec<Complex64>> {
        targets
            .iter()
            .map(|&target| {
                let mut row = vec![Complex64::new(0.0, 0.0); self.n_bins()];
                self.cross_spectrum_into(spectra, seed, target, &mut row);
                row
            })
            .collect()
    }

    fn cross_spectrum_into(
        &self,
        spectra: &TrialSpectra,
        seed: usize,
        target: usize,
        out: &mut [Complex64],
    ) {
        out.iter_mut().for_each(|z| *z = Complex64::new(0.0, 0.0));
        for (t, weight) in self.tapers.weights().iter().enumerate() {
            let (Some(xs), Some(xt)) = (
                spectra.taper_spectrum(seed, t),
                spectra.taper_spectrum(target, t),
            ) else {
                panic!("spectra missing for channel pair ({seed}, {target})");
            };
            for ((acc, s), x) in out.iter_mut().zip(xs).zip(xt) {
                *acc += s.conj() * x * *weight;
            }
        }
        for (acc, &scale) in out.iter_mut().zip(&self.bin_scale) {
            *acc *= scale;
        }
    }

    /// CSD of every pair in `pairs` for one trial. Each channel is
    /// transformed once and reused across the seeds it appears in.
    pub fn trial_csd(&mut self, trial: &Trial, pairs: &ChannelPairs) -> TrialCsd {
        let spectra = self.spectra(trial, &pairs.involved_channels());
        let nb = self.n_bins();
        let mut values = vec![Complex64::new(0.0, 0.0); pairs.len() * nb];
        for (seed, first_row, rows) in pairs.seeds() {
            for (offset, &(_, target)) in rows.iter().enumerate() {
                let row = first_row + offset;
                self.cross_spectrum_into(
                    &spectra,
                    seed,
                    target,
                    &mut values[row * nb..(row + 1) * nb],
                );
            }
        }
        TrialCsd { n_bins: nb, values }
    }
}
