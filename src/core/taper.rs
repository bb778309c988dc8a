//! core/taper.rs — Spectral taper sets for multitaper estimation.
//!
//! A `TaperSet` is an ordered list of unit-energy windows with eigenvalue
//! weights. DPSS (Slepian) windows are the eigenvectors of the symmetric
//! tridiagonal matrix
//!
//!   T[i][i]   = ((N-1-2i)/2)² cos(2πW)
//!   T[i][i+1] = (i+1)(N-1-i)/2
//!
//! with W = NW/N. The weights are the spectral concentration ratios of each
//! window inside [-W, W]. Sets never change after construction and are shared
//! across trial workers behind `Arc`.

use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::{Arc, Mutex, PoisonError};

use rustfft::{FftPlanner, num_complex::Complex64};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::fft::{hann_window_symmetric, normalize_energy};
use crate::error::{ConnectivityError, Result};

/// Concentration threshold used when `low_bias` drops leaky tapers.
pub const LOW_BIAS_THRESHOLD: f64 = 0.9;

const INVERSE_ITERATIONS: usize = 3;
const BISECTION_MAX_STEPS: usize = 256;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum TaperKind {
    /// Discrete prolate spheroidal sequences with time–half-bandwidth `NW`.
    Dpss { half_bandwidth: f64, low_bias: bool },
    /// Single symmetric Hann window.
    #[default]
    Hann,
    /// Single flat window.
    Rectangular,
}

#[derive(Debug, Clone)]
pub struct TaperSet {
    n_samples: usize,
    n_fft: usize,
    windows: Vec<Vec<f64>>,
    weights: Vec<f64>,
}

impl TaperSet {
    /// Build the taper set for `n_samples`-long trials analysed with an
    /// `n_fft`-point FFT.
    pub fn new(n_samples: usize, n_fft: usize, kind: TaperKind) -> Result<Self> {
        if n_fft < n_samples {
            return Err(ConnectivityError::InvalidFftLength { fft_len: n_fft, n_samples });
        }

        let (windows, weights) = match kind {
            TaperKind::Dpss {
                half_bandwidth,
                low_bias,
            } => dpss_tapers(n_samples, half_bandwidth, low_bias)?,
            TaperKind::Hann => single_taper(kind, hann_window_symmetric(n_samples))?,
            TaperKind::Rectangular => single_taper(kind, vec![1.0; n_samples])?,
        };

        debug!(
            target: "lagnet::taper",
            "taper set: kind={kind:?} n_samples={n_samples} n_fft={n_fft} tapers={} weights={weights:?}",
            windows.len()
        );

        Ok(Self {
            n_samples,
            n_fft,
            windows,
            weights,
        })
    }

    #[inline]
    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    #[inline]
    pub fn n_fft(&self) -> usize {
        self.n_fft
    }

    /// Number of tapers (always ≥ 1).
    #[inline]
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn windows(&self) -> &[Vec<f64>] {
        &self.windows
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn weight_sum(&self) -> f64 {
        self.weights.iter().sum()
    }

    /// `(window, weight)` pairs in taper order.
    pub fn iter(&self) -> impl Iterator<Item = (&[f64], f64)> {
        self.windows
            .iter()
            .map(Vec::as_slice)
            .zip(self.weights.iter().copied())
    }
}

fn single_taper(kind: TaperKind, mut w: Vec<f64>) -> Result<(Vec<Vec<f64>>, Vec<f64>)> {
    if normalize_energy(&mut w) <= 0.0 {
        return Err(ConnectivityError::ZeroWindow {
            kind,
            n_samples: w.len(),
        });
    }
    Ok((vec![w], vec![1.0]))
}

// ======================================================================
// DPSS
// ======================================================================

fn dpss_tapers(
    n: usize,
    half_bandwidth: f64,
    low_bias: bool,
) -> Result<(Vec<Vec<f64>>, Vec<f64>)> {
    if !half_bandwidth.is_finite() || half_bandwidth <= 0.0 {
        return Err(ConnectivityError::InvalidBandwidth(half_bandwidth));
    }
    let no_tapers = ConnectivityError::NoTapers {
        half_bandwidth,
        n_samples: n,
    };
    if n == 0 {
        return Err(no_tapers);
    }
    // W must stay below Nyquist (0.5 cycles/sample).
    if 2.0 * half_bandwidth >= n as f64 {
        return Err(ConnectivityError::InvalidBandwidth(half_bandwidth));
    }

    let k_max = ((2.0 * half_bandwidth).floor() as usize).min(n);
    if k_max == 0 {
        return Err(no_tapers);
    }

    let w = half_bandwidth / n as f64;
    let (windows, ratios): (Vec<Vec<f64>>, Vec<f64>) = dpss_windows(n, w, k_max)
        .into_iter()
        .map(|v| {
            let ratio = concentration(&v, w);
            (v, ratio)
        })
        .filter(|&(_, ratio)| !low_bias || ratio > LOW_BIAS_THRESHOLD)
        .unzip();

    if windows.is_empty() {
        return Err(no_tapers);
    }
    Ok((windows, ratios))
}

/// First `k` DPSS windows (largest eigenvalues first), unit energy.
fn dpss_windows(n: usize, w: f64, k: usize) -> Vec<Vec<f64>> {
    let cos_w = (2.0 * PI * w).cos();
    let diag: Vec<f64> = (0..n)
        .map(|i| {
            let c = (n as f64 - 1.0 - 2.0 * i as f64) / 2.0;
            c * c * cos_w
        })
        .collect();
    let off: Vec<f64> = (1..n)
        .map(|i| i as f64 * (n - i) as f64 / 2.0)
        .collect();

    let scale = diag
        .iter()
        .map(|d| d.abs())
        .chain(off.iter().map(|e| e.abs()))
        .fold(1.0f64, f64::max);
    let pivmin = f64::MIN_POSITIVE * scale * scale;

    (0..k)
        .map(|order| {
            let lambda = kth_eigenvalue(&diag, &off, n - 1 - order, pivmin);
            let mut v = inverse_iteration(&diag, &off, lambda, scale);
            fix_sign(&mut v, order);
            v
        })
        .collect()
}

/// Number of eigenvalues strictly below `x` (Sturm sequence).
fn count_below(diag: &[f64], off: &[f64], x: f64, pivmin: f64) -> usize {
    let mut count = 0;
    let mut q = 1.0;
    for (i, &d) in diag.iter().enumerate() {
        q = if i == 0 {
            d - x
        } else {
            d - x - off[i - 1] * off[i - 1] / q
        };
        if q.abs() < pivmin {
            q = -pivmin;
        }
        if q < 0.0 {
            count += 1;
        }
    }
    count
}

/// Eigenvalue with ascending index `idx` by bisection on Gershgorin bounds.
fn kth_eigenvalue(diag: &[f64], off: &[f64], idx: usize, pivmin: f64) -> f64 {
    let n = diag.len();
    let radius = |i: usize| {
        let left = if i > 0 { off[i - 1].abs() } else { 0.0 };
        let right = if i + 1 < n { off[i].abs() } else { 0.0 };
        left + right
    };
    let mut lo = (0..n).map(|i| diag[i] - radius(i)).fold(f64::INFINITY, f64::min);
    let mut hi = (0..n)
        .map(|i| diag[i] + radius(i))
        .fold(f64::NEG_INFINITY, f64::max);
    let pad = f64::EPSILON * lo.abs().max(hi.abs()).max(1.0);
    lo -= pad;
    hi += pad;

    for _ in 0..BISECTION_MAX_STEPS {
        let mid = 0.5 * (lo + hi);
        if mid <= lo || mid >= hi {
            break;
        }
        if count_below(diag, off, mid, pivmin) > idx {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    0.5 * (lo + hi)
}

/// Eigenvector for `lambda` by inverse iteration on `T - λI`.
fn inverse_iteration(diag: &[f64], off: &[f64], lambda: f64, scale: f64) -> Vec<f64> {
    let n = diag.len();
    let shifted: Vec<f64> = diag.iter().map(|&d| d - lambda).collect();
    let lu = TridiagLu::factor(off.to_vec(), shifted, off.to_vec(), f64::EPSILON * scale);

    // Start vector with both symmetric and antisymmetric content.
    let mut v: Vec<f64> = (0..n)
        .map(|i| 1.0 + 0.5 * (i as f64 + 1.0) / n as f64)
        .collect();
    for _ in 0..INVERSE_ITERATIONS {
        lu.solve(&mut v);
        let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm > 0.0 && norm.is_finite() {
            v.iter_mut().for_each(|x| *x /= norm);
        }
    }
    v
}

/// Even orders: positive sum. Odd orders: positive first lobe.
fn fix_sign(v: &mut [f64], order: usize) {
    let n = v.len();
    let centre = (n as f64 - 1.0) / 2.0;
    let s: f64 = if order % 2 == 0 {
        v.iter().sum()
    } else {
        v.iter()
            .enumerate()
            .map(|(i, &x)| (centre - i as f64) * x)
            .sum()
    };
    if s < 0.0 {
        v.iter_mut().for_each(|x| *x = -*x);
    }
}

/// Fraction of window energy inside [-W, W]:
/// λ = 2W r[0] + 2 Σ_{l≥1} r[l] sin(2πWl)/(πl), r = autocorrelation.
fn concentration(v: &[f64], w: f64) -> f64 {
    let r = autocorrelation(v);
    let mut lambda = 2.0 * w * r[0];
    for (l, &rl) in r.iter().enumerate().skip(1) {
        let lf = l as f64;
        lambda += 2.0 * rl * (2.0 * PI * w * lf).sin() / (PI * lf);
    }
    lambda
}

/// Linear autocorrelation r[l] = Σ v[i] v[i+l] for l = 0..n via FFT.
fn autocorrelation(v: &[f64]) -> Vec<f64> {
    let n = v.len();
    let m = (2 * n).next_power_of_two();
    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(m);
    let ifft = planner.plan_fft_inverse(m);

    let mut buf = vec![Complex64::new(0.0, 0.0); m];
    for (slot, &x) in buf.iter_mut().zip(v) {
        slot.re = x;
    }
    fft.process(&mut buf);
    for z in buf.iter_mut() {
        *z = Complex64::new(z.norm_sqr(), 0.0);
    }
    ifft.process(&mut buf);

    let scale = 1.0 / m as f64;
    buf[..n].iter().map(|z| z.re * scale).collect()
}

// ======================================================================
// Tridiagonal LU with partial pivoting
// ======================================================================

/// LU factors of a tridiagonal matrix with row interchanges.
///
/// Row swaps introduce a second superdiagonal (`du2`). Exact zero pivots are
/// replaced by `tiny` so the factor stays usable for inverse iteration.
struct TridiagLu {
    dl: Vec<f64>,
    d: Vec<f64>,
    du: Vec<f64>,
    du2: Vec<f64>,
    swapped: Vec<bool>,
}

impl TridiagLu {
    fn factor(mut dl: Vec<f64>, mut d: Vec<f64>, mut du: Vec<f64>, tiny: f64) -> Self {
        let n = d.len();
        let mut du2 = vec![0.0; n.saturating_sub(2)];
        let mut swapped = vec![false; n.saturating_sub(1)];

        for i in 0..n.saturating_sub(1) {
            if d[i].abs() >= dl[i].abs() {
                if d[i] != 0.0 {
                    let fact = dl[i] / d[i];
                    dl[i] = fact;
                    d[i + 1] -= fact * du[i];
                }
            } else {
                let fact = d[i] / dl[i];
                d[i] = dl[i];
                dl[i] = fact;
                let temp = du[i];
                du[i] = d[i + 1];
                d[i + 1] = temp - fact * d[i + 1];
                if i + 2 < n {
                    du2[i] = du[i + 1];
                    du[i + 1] = -fact * du[i + 1];
                }
                swapped[i] = true;
            }
        }

        let tiny = if tiny > 0.0 { tiny } else { f64::MIN_POSITIVE };
        for di in d.iter_mut() {
            if *di == 0.0 {
                *di = tiny;
            }
        }

        Self {
            dl,
            d,
            du,
            du2,
            swapped,
        }
    }

    fn solve(&self, b: &mut [f64]) {
        let n = self.d.len();
        if n == 0 {
            return;
        }
        for i in 0..n - 1 {
            if self.swapped[i] {
                let temp = b[i] - self.dl[i] * b[i + 1];
                b[i] = b[i + 1];
                b[i + 1] = temp;
            } else {
                b[i + 1] -= self.dl[i] * b[i];
            }
        }

        b[n - 1] /= self.d[n - 1];
        if n > 1 {
            b[n - 2] = (b[n - 2] - self.du[n - 2] * b[n - 1]) / self.d[n - 2];
        }
        for i in (0..n.saturating_sub(2)).rev() {
            b[i] = (b[i] - self.du[i] * b[i + 1] - self.du2[i] * b[i + 2]) / self.d[i];
        }
    }
}

// ======================================================================
// Cache
// ======================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct TaperKey {
    n_samples: usize,
    n_fft: usize,
    kind: u8,
    bandwidth_bits: u64,
    low_bias: bool,
}

impl TaperKey {
    fn new(n_samples: usize, n_fft: usize, kind: TaperKind) -> Self {
        let (tag, bandwidth_bits, low_bias) = match kind {
            TaperKind::Dpss {
                half_bandwidth,
                low_bias,
            } => (0, half_bandwidth.to_bits(), low_bias),
            TaperKind::Hann => (1, 0, false),
            TaperKind::Rectangular => (2, 0, false),
        };
        Self {
            n_samples,
            n_fft,
            kind: tag,
            bandwidth_bits,
            low_bias,
        }
    }
}

/// Memoized taper sets keyed by (sample count, FFT length, kind).
#[derive(Debug, Default)]
pub struct TaperCache {
    sets: Mutex<HashMap<TaperKey, Arc<TaperSet>>>,
}

impl TaperCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compute(
        &self,
        n_samples: usize,
        n_fft: usize,
        kind: TaperKind,
    ) -> Result<Arc<TaperSet>> {
        let key = TaperKey::new(n_samples, n_fft, kind);
        // Entries are inserted whole, so a poisoned map is still consistent.
        if let Some(set) = self
            .sets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(Arc::clone(set));
        }

        let computed = Arc::new(TaperSet::new(n_samples, n_fft, kind)?);
        let mut sets = self.sets.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(sets.entry(key).or_insert(computed)))
    }

    pub fn len(&self) -> usize {
        self.sets.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
