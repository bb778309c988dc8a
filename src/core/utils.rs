use std::f64::consts::TAU;

use rand::{Rng, SeedableRng};

use crate::core::trial::Trial;
use crate::error::Result;

/// Synthetic repeated-trial recording: every channel carries one sinusoid,
/// channel `c` lagging channel 0 by `c * lag_deg`, plus white noise.
/// The sinusoid's starting phase is random per trial, so only the lag is
/// consistent across trials.
#[derive(Debug, Clone, PartialEq)]
pub struct LaggedSine {
    pub n_trials: usize,
    pub n_channels: usize,
    pub n_samples: usize,
    pub sampling_rate: f64,
    pub freq_hz: f64,
    pub lag_deg: f64,
    /// Noise amplitude relative to the unit sinusoid.
    pub noise: f64,
    pub seed: u64,
}

impl Default for LaggedSine {
    fn default() -> Self {
        Self {
            n_trials: 40,
            n_channels: 4,
            n_samples: 256,
            sampling_rate: 256.0,
            freq_hz: 10.0,
            lag_deg: 45.0,
            noise: 0.5,
            seed: 1,
        }
    }
}

impl LaggedSine {
    pub fn trials(&self) -> Result<Vec<Trial>> {
        let mut rng = rand::rngs::StdRng::seed_from_u64(self.seed);
        let lag = self.lag_deg.to_radians();
        let omega = TAU * self.freq_hz / self.sampling_rate;

        (0..self.n_trials)
            .map(|_| {
                let phase = rng.random_range(0.0..TAU);
                let mut data = Vec::with_capacity(self.n_channels * self.n_samples);
                for ch in 0..self.n_channels {
                    let offset = phase - ch as f64 * lag;
                    data.extend((0..self.n_samples).map(|i| {
                        (omega * i as f64 + offset).sin() + self.noise * rng.random_range(-1.0..1.0)
                    }));
                }
                Trial::from_row_major(self.n_channels, self.n_samples, data)
            })
            .collect()
    }
}
