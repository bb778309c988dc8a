//! Debiased squared weighted phase-lag index (dSWPLI) connectivity from
//! repeated-trial multichannel recordings.
//!
//! Trials are tapered and transformed independently on a worker pool, their
//! cross-spectra merged into shared running sums, and the sums reduced to a
//! channel-pair network with one value per frequency bin.

pub mod config;
pub mod core;
pub mod error;

pub use crate::core::engine::{ConnectivityEngine, calculate, calculate_many, calculate_with_cancel};
pub use crate::core::metric::{CsdReduction, Metric};
pub use crate::core::network::{Edge, FrequencyBand, Network, Node};
pub use crate::core::pairs::PairSelection;
pub use crate::core::settings::ConnectivitySettings;
pub use crate::core::taper::TaperKind;
pub use crate::core::trial::Trial;
pub use crate::error::{ConnectivityError, Result};
