use thiserror::Error;

use crate::core::taper::TaperKind;

/// Errors raised by a connectivity invocation.
///
/// Configuration variants are detected before any trial is dispatched.
/// Numerical degeneracy (a zero denominator in a reduction) is never an error.
#[derive(Debug, Error)]
pub enum ConnectivityError {
    #[error("no trials supplied")]
    NoTrials,

    #[error("trial {trial} has no samples or no channels")]
    EmptyTrial { trial: usize },

    #[error("trial {trial} is malformed: {reason}")]
    MalformedTrial { trial: usize, reason: String },

    #[error("trial {trial} has {found} channels, expected {expected}")]
    InconsistentChannels {
        trial: usize,
        expected: usize,
        found: usize,
    },

    #[error("trial {trial} has {found} samples, expected {expected}")]
    InconsistentSamples {
        trial: usize,
        expected: usize,
        found: usize,
    },

    #[error("fft length {fft_len} is smaller than the sample count {n_samples}")]
    InvalidFftLength { fft_len: usize, n_samples: usize },

    #[error("sampling rate must be finite and positive, got {0}")]
    InvalidSamplingRate(f64),

    #[error("taper half-bandwidth must be finite and positive, got {0}")]
    InvalidBandwidth(f64),

    #[error("half-bandwidth {half_bandwidth} yields no usable tapers for {n_samples} samples")]
    NoTapers {
        half_bandwidth: f64,
        n_samples: usize,
    },

    #[error("{kind:?} window over {n_samples} samples is all zeros")]
    ZeroWindow { kind: TaperKind, n_samples: usize },

    #[error("channel pair ({0}, {1}) is out of range for {2} channels")]
    PairOutOfRange(usize, usize, usize),

    #[error("channel pair ({0}, {0}) pairs a channel with itself")]
    SelfPair(usize),

    #[error("pair selection produced no channel pairs")]
    NoPairs,

    #[error("failed to spawn trial worker: {0}")]
    WorkerSpawn(#[from] std::io::Error),

    #[error("accumulator lock poisoned by a panicking worker")]
    AccumulatorPoisoned,

    #[error("accumulated {merged} trials, expected {expected}")]
    IncompleteAccumulation { merged: usize, expected: usize },

    #[error("computation cancelled before all trials were merged")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, ConnectivityError>;
