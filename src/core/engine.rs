//! Connectivity engine: Dispatch → Accumulate → Reduce.
//!
//! Dispatch validates the settings, resolves the channel pairs and builds
//! the taper set once. Accumulate runs every trial through the worker pool
//! and waits on a single barrier. Reduce walks the finalized sums once per
//! requested metric and emits a `Network`.
//!
//! Nothing is dispatched unless every configuration check passes, and the
//! accumulator is never read until every trial has been merged.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use rustfft::{Fft, FftPlanner};
use tracing::{debug, info};

use crate::core::accumulator::{AccumulatedSums, AccumulationState};
use crate::core::fft::n_bins;
use crate::core::metric::{CsdReduction, Metric};
use crate::core::network::{Edge, Network, Node};
use crate::core::pairs::ChannelPairs;
use crate::core::settings::ConnectivitySettings;
use crate::core::taper::{TaperCache, TaperSet};
use crate::core::trial::{TrialShape, common_gain, validate_trials};
use crate::core::trial_worker::{self, WorkerShared};
use crate::error::{ConnectivityError, Result};

/// Debiased squared WPLI for `settings`.
pub fn calculate(settings: &ConnectivitySettings) -> Result<Network> {
    ConnectivityEngine::new().calculate(settings)
}

/// Like [`calculate`], stopping early once `cancel` is set.
pub fn calculate_with_cancel(settings: &ConnectivitySettings, cancel: &AtomicBool) -> Result<Network> {
    ConnectivityEngine::new().calculate_with_cancel(settings, cancel)
}

/// One accumulation pass, reduced once per metric (in the given order).
pub fn calculate_many(settings: &ConnectivitySettings, metrics: &[Metric]) -> Result<Vec<Network>> {
    ConnectivityEngine::new().calculate_many(settings, metrics)
}

impl Metric {
    pub fn calculate(self, settings: &ConnectivitySettings) -> Result<Network> {
        ConnectivityEngine::new().calculate_metric(self, settings)
    }
}

/// Engine with a taper cache that outlives single invocations.
#[derive(Debug, Default)]
pub struct ConnectivityEngine {
    tapers: TaperCache,
}

/// Everything Dispatch resolves before any worker starts.
struct Dispatch {
    shape: TrialShape,
    n_fft: usize,
    pairs: ChannelPairs,
    tapers: Arc<TaperSet>,
    plan: Arc<dyn Fft<f64>>,
    input_gain: f64,
    n_workers: usize,
}

impl ConnectivityEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn taper_cache(&self) -> &TaperCache {
        &self.tapers
    }

    pub fn calculate(&self, settings: &ConnectivitySettings) -> Result<Network> {
        self.calculate_metric(Metric::DebiasedSquaredWpli, settings)
    }

    pub fn calculate_metric(&self, metric: Metric, settings: &ConnectivitySettings) -> Result<Network> {
        let never = AtomicBool::new(false);
        self.single(metric, settings, &never)
    }

    pub fn calculate_with_cancel(
        &self,
        settings: &ConnectivitySettings,
        cancel: &AtomicBool,
    ) -> Result<Network> {
        self.single(Metric::DebiasedSquaredWpli, settings, cancel)
    }

    pub fn calculate_many(&self, settings: &ConnectivitySettings, metrics: &[Metric]) -> Result<Vec<Network>> {
        let never = AtomicBool::new(false);
        self.run(settings, metrics, &never)
    }

    fn single(&self, metric: Metric, settings: &ConnectivitySettings, cancel: &AtomicBool) -> Result<Network> {
        let started = Instant::now();
        let (dispatch, sums) = self.accumulate_pass(settings, cancel)?;
        let network = reduce(metric, settings, &dispatch, &sums);
        log_summary(&dispatch, &sums, 1, started);
        Ok(network)
    }

    /// Full pipeline. Every network shares the same accumulation pass.
    pub fn run(
        &self,
        settings: &ConnectivitySettings,
        metrics: &[Metric],
        cancel: &AtomicBool,
    ) -> Result<Vec<Network>> {
        let started = Instant::now();
        let (dispatch, sums) = self.accumulate_pass(settings, cancel)?;
        let networks: Vec<Network> = metrics
            .iter()
            .map(|&metric| reduce(metric, settings, &dispatch, &sums))
            .collect();
        log_summary(&dispatch, &sums, networks.len(), started);
        Ok(networks)
    }

    fn accumulate_pass(
        &self,
        settings: &ConnectivitySettings,
        cancel: &AtomicBool,
    ) -> Result<(Dispatch, AccumulatedSums)> {
        let dispatch = self.dispatch(settings)?;
        let sums = accumulate(settings, &dispatch, cancel)?;
        Ok((dispatch, sums))
    }

    fn dispatch(&self, settings: &ConnectivitySettings) -> Result<Dispatch> {
        let fs = settings.sampling_rate;
        if !(fs.is_finite() && fs > 0.0) {
            return Err(ConnectivityError::InvalidSamplingRate(fs));
        }
        let shape = validate_trials(&settings.trials)?;
        let n_fft = settings.fft_len.unwrap_or(shape.n_samples);
        if n_fft < shape.n_samples {
            return Err(ConnectivityError::InvalidFftLength {
                fft_len: n_fft,
                n_samples: shape.n_samples,
            });
        }
        let pairs = ChannelPairs::resolve(&settings.pairs, shape.n_channels)?;
        let tapers = self
            .tapers
            .get_or_compute(shape.n_samples, n_fft, settings.taper)?;
        let plan = FftPlanner::<f64>::new().plan_fft_forward(n_fft);
        let input_gain = common_gain(&settings.trials);
        let n_workers = settings.worker_count().min(settings.trials.len());

        debug!(
            target: "lagnet::engine",
            "dispatch: trials={} shape={shape:?} n_fft={n_fft} pairs={} tapers={} gain={input_gain:e} \
             workers={n_workers}",
            settings.trials.len(),
            pairs.len(),
            tapers.len()
        );
        Ok(Dispatch {
            shape,
            n_fft,
            pairs,
            tapers,
            plan,
            input_gain,
            n_workers,
        })
    }
}

fn log_summary(dispatch: &Dispatch, sums: &AccumulatedSums, n_networks: usize, started: Instant) {
    info!(
        target: "lagnet::engine",
        "computed {n_networks} network(s): trials={} channels={} pairs={} bins={} tapers={} in {:.1} ms",
        sums.n_trials(),
        dispatch.shape.n_channels,
        dispatch.pairs.len(),
        sums.n_bins(),
        dispatch.tapers.len(),
        started.elapsed().as_secs_f64() * 1e3
    );
}

fn accumulate(settings: &ConnectivitySettings, dispatch: &Dispatch, cancel: &AtomicBool) -> Result<AccumulatedSums> {
    let expected = settings.trials.len();
    let state = AccumulationState::new(dispatch.pairs.len(), n_bins(dispatch.n_fft));
    let shared = WorkerShared {
        trials: &settings.trials,
        pairs: &dispatch.pairs,
        tapers: Arc::clone(&dispatch.tapers),
        plan: Arc::clone(&dispatch.plan),
        input_gain: dispatch.input_gain,
        state: &state,
        cancel,
    };
    trial_worker::accumulate(&shared, dispatch.n_workers)?;

    if cancel.load(Ordering::Relaxed) {
        debug!(target: "lagnet::engine", "accumulate: cancelled");
        return Err(ConnectivityError::Cancelled);
    }
    let sums = state.into_sums()?;
    if sums.n_trials() != expected {
        return Err(ConnectivityError::IncompleteAccumulation {
            merged: sums.n_trials(),
            expected,
        });
    }
    debug!(target: "lagnet::engine", "accumulate: merged {expected} trials");
    Ok(sums)
}

fn reduce(metric: Metric, settings: &ConnectivitySettings, dispatch: &Dispatch, sums: &AccumulatedSums) -> Network {
    let rows = metric.reduce(sums);
    let edges = dispatch
        .pairs
        .pairs()
        .iter()
        .zip(rows)
        .map(|(&(from, to), weights)| Edge { from, to, weights })
        .collect();
    let nodes = (0..dispatch.shape.n_channels)
        .map(|index| Node {
            index,
            label: settings.node_label(index),
        })
        .collect();
    debug!(target: "lagnet::engine", "reduce: metric={metric}");
    Network::new(
        metric,
        settings.sampling_rate,
        dispatch.n_fft,
        sums.n_trials(),
        nodes,
        edges,
    )
}
