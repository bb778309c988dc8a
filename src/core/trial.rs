//! Repeated-trial recordings: one channel × sample matrix per trial.

use crate::error::{ConnectivityError, Result};

/// Channel × sample matrix for one repetition, stored row-major
/// (one contiguous row per channel).
#[derive(Clone, Debug, PartialEq)]
pub struct Trial {
    n_channels: usize,
    n_samples: usize,
    data: Vec<f64>,
}

impl Trial {
    /// Build from row-major samples. `data.len()` must equal
    /// `n_channels * n_samples`.
    pub fn from_row_major(n_channels: usize, n_samples: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != n_channels * n_samples {
            return Err(ConnectivityError::MalformedTrial {
                trial: 0,
                reason: format!(
                    "{} samples do not fill a {n_channels}x{n_samples} matrix",
                    data.len()
                ),
            });
        }
        Ok(Self {
            n_channels,
            n_samples,
            data,
        })
    }

    /// Build from per-channel rows; all rows must share a length.
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> Result<Self> {
        let n_channels = rows.len();
        let n_samples = rows.first().map_or(0, |r| r.as_ref().len());
        let mut data = Vec::with_capacity(n_channels * n_samples);
        for (ch, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != n_samples {
                return Err(ConnectivityError::MalformedTrial {
                    trial: 0,
                    reason: format!(
                        "channel {ch} has {} samples, channel 0 has {n_samples}",
                        row.len()
                    ),
                });
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            n_channels,
            n_samples,
            data,
        })
    }

    #[inline]
    pub fn n_channels(&self) -> usize {
        self.n_channels
    }

    #[inline]
    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    #[inline]
    pub fn channel(&self, ch: usize) -> &[f64] {
        let start = ch * self.n_samples;
        &self.data[start..start + self.n_samples]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.data.chunks_exact(self.n_samples.max(1)).take(self.n_channels)
    }

    /// Copy with every sample multiplied by `gain`.
    pub fn scaled(&self, gain: f64) -> Self {
        Self {
            n_channels: self.n_channels,
            n_samples: self.n_samples,
            data: self.data.iter().map(|&x| x * gain).collect(),
        }
    }

    /// Largest absolute sample; 0.0 for a silent trial.
    pub fn peak_abs(&self) -> f64 {
        self.data.iter().fold(0.0, |peak, x| peak.max(x.abs()))
    }

    fn first_non_finite(&self) -> Option<(usize, usize)> {
        self.data
            .iter()
            .position(|x| !x.is_finite())
            .map(|idx| (idx / self.n_samples, idx % self.n_samples))
    }
}

/// Shape shared by every trial of one invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrialShape {
    pub n_channels: usize,
    pub n_samples: usize,
}

/// Check that trials are non-empty, finite, and share one shape.
pub fn validate_trials(trials: &[Trial]) -> Result<TrialShape> {
    let first = trials.first().ok_or(ConnectivityError::NoTrials)?;
    let shape = TrialShape {
        n_channels: first.n_channels(),
        n_samples: first.n_samples(),
    };

    for (idx, trial) in trials.iter().enumerate() {
        if trial.n_channels() == 0 || trial.n_samples() == 0 {
            return Err(ConnectivityError::EmptyTrial { trial: idx });
        }
        if trial.n_channels() != shape.n_channels {
            return Err(ConnectivityError::InconsistentChannels {
                trial: idx,
                expected: shape.n_channels,
                found: trial.n_channels(),
            });
        }
        if trial.n_samples() != shape.n_samples {
            return Err(ConnectivityError::InconsistentSamples {
                trial: idx,
                expected: shape.n_samples,
                found: trial.n_samples(),
            });
        }
        if let Some((ch, sample)) = trial.first_non_finite() {
            return Err(ConnectivityError::MalformedTrial {
                trial: idx,
                reason: format!("non-finite value at channel {ch}, sample {sample}"),
            });
        }
    }
    Ok(shape)
}

/// Power-of-two gain that brings the largest |sample| across `trials` into
/// [1, 2). One gain serves every trial, and multiplying by a power of two
/// only shifts exponents, so the scaled samples are exact.
pub fn common_gain(trials: &[Trial]) -> f64 {
    let peak = trials.iter().map(Trial::peak_abs).fold(0.0, f64::max);
    if !(peak.is_finite() && peak > 0.0) {
        return 1.0;
    }
    let exponent = (peak.log2().floor() as i32).clamp(-MAX_GAIN_EXPONENT, MAX_GAIN_EXPONENT);
    2f64.powi(-exponent)
}

// Keeps the gain itself a normal float.
const MAX_GAIN_EXPONENT: i32 = 1000;
