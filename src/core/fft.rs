use std::sync::Arc;

use rustfft::{Fft, Length, num_complex::Complex64};

/// Symmetric Hann window (taper design)
/// w[i] = 0.5 * (1 - cos(2πi/(N-1)))
#[inline]
pub fn hann_window_symmetric(n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![1.0],
        _ => {
            let two_pi = std::f64::consts::PI * 2.0;
            let denom = (n - 1) as f64;
            let mut w = Vec::with_capacity(n);
            for i in 0..n {
                let phi = two_pi * i as f64 / denom;
                w.push(0.5 * (1.0 - phi.cos()));
            }
            w
        }
    }
}

/// Scale a window in place to unit energy (Σw² = 1).
/// Returns the energy before scaling; an all-zero window is left untouched.
pub fn normalize_energy(w: &mut [f64]) -> f64 {
    let energy: f64 = w.iter().map(|&v| v * v).sum();
    if energy > 0.0 {
        let inv = 1.0 / energy.sqrt();
        w.iter_mut().for_each(|v| *v *= inv);
    }
    energy
}

/// Number of retained bins for a real input of length `n_fft` (DC..=Nyquist).
#[inline]
pub fn n_bins(n_fft: usize) -> usize {
    n_fft / 2 + 1
}

/// Bin center frequencies for the retained half spectrum.
pub fn bin_freqs_hz(fs: f64, n_fft: usize) -> Vec<f64> {
    (0..n_bins(n_fft))
        .map(|k| k as f64 * fs / n_fft as f64)
        .collect()
}

/// One-sided spectrum factor: interior bins carry the folded negative half.
#[inline]
pub fn one_sided_scale(k: usize, n_fft: usize) -> f64 {
    let nyquist = n_fft.is_multiple_of(2) && k == n_fft / 2;
    if k == 0 || nyquist { 1.0 } else { 2.0 }
}

// ======================================================================
// Tapered forward FFT of real rows
// ======================================================================

/// Forward FFT of tapered, zero-padded real rows, keeping DC..=Nyquist.
///
/// The plan is shared; each owner keeps its own buffer and scratch, so one
/// `TaperedFft` per worker thread.
pub struct TaperedFft {
    pub n_fft: usize,
    fft: Arc<dyn Fft<f64>>,
    buf: Vec<Complex64>,
    scratch: Vec<Complex64>,
}

impl TaperedFft {
    #[cfg(test)]
    pub fn new(n_fft: usize) -> Self {
        let mut planner = rustfft::FftPlanner::<f64>::new();
        Self::with_plan(planner.plan_fft_forward(n_fft))
    }

    /// Reuse an existing forward plan (its length defines the FFT length).
    pub fn with_plan(fft: Arc<dyn Fft<f64>>) -> Self {
        let n_fft = fft.len();
        let scratch_len = fft.get_inplace_scratch_len();
        Self {
            n_fft,
            fft,
            buf: vec![Complex64::new(0.0, 0.0); n_fft],
            scratch: vec![Complex64::new(0.0, 0.0); scratch_len],
        }
    }

    /// Write the half spectrum of `samples * gain * taper` into `out`.
    ///
    /// `out.len()` must equal `n_bins(n_fft)`. DC and the even-length Nyquist
    /// bin of a real input are real, so their imaginary residue is dropped.
    pub fn half_spectrum(&mut self, samples: &[f64], gain: f64, taper: &[f64], out: &mut [Complex64]) {
        debug_assert_eq!(samples.len(), taper.len());
        debug_assert!(samples.len() <= self.n_fft);
        debug_assert_eq!(out.len(), n_bins(self.n_fft));

        for (slot, (&x, &w)) in self.buf.iter_mut().zip(samples.iter().zip(taper)) {
            *slot = Complex64::new(x * gain * w, 0.0);
        }
        for slot in self.buf[samples.len()..].iter_mut() {
            *slot = Complex64::new(0.0, 0.0);
        }

        self.fft.process_with_scratch(&mut self.buf, &mut self.scratch);
        out.copy_from_slice(&self.buf[..out.len()]);

        out[0].im = 0.0;
        if self.n_fft.is_multiple_of(2) {
            out[self.n_fft / 2].im = 0.0;
        }
    }
}

// ======================================================================
// Tests
// ======================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn hann_window_symmetric_props() {
        let n = 1024;
        let w = hann_window_symmetric(n);
        assert!(w.iter().all(|&v| v >= 0.0));
        assert!(w.first().unwrap().abs() < 1e-12, "first sample not ~0");
        assert!(w.last().unwrap().abs() < 1e-12, "last sample not ~0");

        let max_err = (0..n / 2)
            .map(|i| (w[i] - w[n - 1 - i]).abs())
            .fold(0.0f64, f64::max);
        assert!(max_err < 1e-12, "symmetry max_err={max_err}");

        // mean(w^2) ≈ 3/8
        let u: f64 = w.iter().map(|&x| x * x).sum::<f64>() / n as f64;
        assert!((u - 0.375).abs() < 1e-3, "mean-square mismatch: {u}");
    }

    #[test]
    fn hann_window_small_n_edges() {
        assert!(hann_window_symmetric(0).is_empty());
        assert_eq!(hann_window_symmetric(1), vec![1.0]);
        assert_eq!(hann_window_symmetric(2), vec![0.0, 0.0]);
    }

    #[test]
    fn normalize_energy_gives_unit_norm() {
        let mut w = hann_window_symmetric(64);
        let before = normalize_energy(&mut w);
        assert!(before > 0.0);
        let after: f64 = w.iter().map(|v| v * v).sum();
        assert_relative_eq!(after, 1.0, epsilon = 1e-12);

        let mut zeros = vec![0.0; 4];
        assert_eq!(normalize_energy(&mut zeros), 0.0);
        assert!(zeros.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn bin_layout_even_and_odd() {
        assert_eq!(n_bins(8), 5);
        assert_eq!(n_bins(9), 5);
        let f = bin_freqs_hz(100.0, 8);
        assert_eq!(f.len(), 5);
        assert_relative_eq!(f[1], 12.5);
        assert_relative_eq!(f[4], 50.0);

        assert_eq!(one_sided_scale(0, 8), 1.0);
        assert_eq!(one_sided_scale(3, 8), 2.0);
        assert_eq!(one_sided_scale(4, 8), 1.0);
        assert_eq!(one_sided_scale(4, 9), 2.0);
    }

    #[test]
    fn half_spectrum_matches_direct_dft() {
        let n = 12usize;
        let n_fft = 16usize;
        let x: Vec<f64> = (0..n).map(|i| ((i * 7 % 5) as f64) - 2.0).collect();
        let taper = hann_window_symmetric(n);

        let mut tf = TaperedFft::new(n_fft);
        let mut out = vec![Complex64::new(0.0, 0.0); n_bins(n_fft)];
        tf.half_spectrum(&x, 1.0, &taper, &mut out);

        for (k, got) in out.iter().enumerate() {
            let mut expected = Complex64::new(0.0, 0.0);
            for i in 0..n {
                let phi = -2.0 * std::f64::consts::PI * (k * i) as f64 / n_fft as f64;
                expected += Complex64::from_polar(x[i] * taper[i], phi);
            }
            assert!(
                (got - expected).norm() < 1e-10,
                "bin {k}: got {got}, expected {expected}"
            );
        }
        assert_eq!(out[0].im, 0.0);
        assert_eq!(out[n_fft / 2].im, 0.0);
    }

    #[test]
    fn half_spectrum_clears_padding_between_calls() {
        let mut tf = TaperedFft::new(8);
        let mut a = vec![Complex64::new(0.0, 0.0); 5];
        let mut b = vec![Complex64::new(0.0, 0.0); 5];
        tf.half_spectrum(&[1.0; 8], 1.0, &[1.0; 8], &mut a);
        tf.half_spectrum(&[1.0; 4], 1.0, &[1.0; 4], &mut b);
        assert_relative_eq!(a[0].re, 8.0, epsilon = 1e-12);
        assert_relative_eq!(b[0].re, 4.0, epsilon = 1e-12);
    }
}
