use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Instant;

use crossbeam_channel::Receiver;
use rustfft::Fft;
use tracing::debug;

use crate::core::accumulator::AccumulationState;
use crate::core::csd::{TrialCsd, TrialSpectralEstimator};
use crate::core::pairs::ChannelPairs;
use crate::core::taper::TaperSet;
use crate::core::trial::Trial;
use crate::error::{ConnectivityError, Result};

/// One trial's unit of work. Computing touches no shared state; only the
/// caller's merge does.
#[derive(Clone, Copy, Debug)]
pub struct TrialComputeTask<'a> {
    pub index: usize,
    pub trial: &'a Trial,
}

impl TrialComputeTask<'_> {
    pub fn compute(&self, estimator: &mut TrialSpectralEstimator, pairs: &ChannelPairs) -> TrialCsd {
        estimator.trial_csd(self.trial, pairs)
    }
}

/// Read-only inputs shared by every worker of one invocation.
pub struct WorkerShared<'a> {
    pub trials: &'a [Trial],
    pub pairs: &'a ChannelPairs,
    pub tapers: Arc<TaperSet>,
    pub plan: Arc<dyn Fft<f64>>,
    /// Shared sample gain, see [`crate::core::trial::common_gain`].
    pub input_gain: f64,
    pub state: &'a AccumulationState,
    pub cancel: &'a AtomicBool,
}

/// Trial worker: pulls trial indices until the queue is drained or
/// cancellation is requested, merging each trial's CSD as it finishes.
/// Returns the number of trials this worker merged.
pub fn run(worker: usize, shared: &WorkerShared<'_>, job_rx: Receiver<usize>) -> Result<usize> {
    let started = Instant::now();
    let mut estimator = TrialSpectralEstimator::new(Arc::clone(&shared.tapers), Arc::clone(&shared.plan))
        .with_input_gain(shared.input_gain);
    let mut merged = 0usize;

    while let Ok(index) = job_rx.recv() {
        if shared.cancel.load(Ordering::Relaxed) {
            debug!(target: "lagnet::worker", "worker {worker}: cancelled before trial {index}");
            break;
        }
        let task = TrialComputeTask {
            index,
            trial: &shared.trials[index],
        };
        // Spectral work stays outside the accumulator lock.
        let csd = task.compute(&mut estimator, shared.pairs);
        shared.state.merge(&csd)?;
        merged += 1;
    }

    debug!(
        target: "lagnet::worker",
        "worker {worker}: merged {merged} trials in {:.3} ms",
        started.elapsed().as_secs_f64() * 1e3
    );
    Ok(merged)
}

/// Run every trial through a fixed pool of `n_workers` scoped threads.
///
/// Returns once all workers have exited (the only barrier of an invocation).
pub fn accumulate(shared: &WorkerShared<'_>, n_workers: usize) -> Result<usize> {
    let n_trials = shared.trials.len();
    let n_workers = n_workers.clamp(1, n_trials.max(1));

    let (job_tx, job_rx) = crossbeam_channel::unbounded::<usize>();
    for index in 0..n_trials {
        // The receiver is alive, so sending cannot fail.
        let _ = job_tx.send(index);
    }
    drop(job_tx);

    debug!(
        target: "lagnet::worker",
        "dispatching {n_trials} trials to {n_workers} workers"
    );

    thread::scope(|scope| {
        let mut handles = Vec::with_capacity(n_workers);
        for worker in 0..n_workers {
            let rx = job_rx.clone();
            let spawned = thread::Builder::new()
                .name(format!("lagnet-trial-{worker}"))
                .spawn_scoped(scope, move || run(worker, shared, rx));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    // Starve the workers already running so the scope ends quickly.
                    while job_rx.try_recv().is_ok() {}
                    return Err(ConnectivityError::WorkerSpawn(err));
                }
            }
        }

        let mut total = 0usize;
        let mut first_err = None;
        for handle in handles {
            match handle.join() {
                Ok(Ok(n)) => total += n,
                Ok(Err(err)) => {
                    first_err.get_or_insert(err);
                }
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(total),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pairs::PairSelection;
    use crate::core::taper::TaperKind;
    use rustfft::FftPlanner;

    fn fixture(n_trials: usize) -> (Vec<Trial>, ChannelPairs, Arc<TaperSet>, Arc<dyn Fft<f64>>) {
        let trials = (0..n_trials)
            .map(|t| {
                let rows: Vec<Vec<f64>> = (0..3)
                    .map(|ch| {
                        (0..32)
                            .map(|i| ((i as f64) * 0.3 + t as f64 + ch as f64 * 0.7).sin())
                            .collect()
                    })
                    .collect();
                Trial::from_rows(&rows).unwrap()
            })
            .collect();
        let pairs = ChannelPairs::resolve(&PairSelection::AllPairs, 3).unwrap();
        let tapers = Arc::new(TaperSet::new(32, 32, TaperKind::Hann).unwrap());
        let plan = FftPlanner::<f64>::new().plan_fft_forward(32);
        (trials, pairs, tapers, plan)
    }

    #[test]
    fn every_trial_is_merged_exactly_once() {
        let (trials, pairs, tapers, plan) = fixture(9);
        for n_workers in [1, 2, 4, 16] {
            let state = AccumulationState::new(pairs.len(), 17);
            let cancel = AtomicBool::new(false);
            let shared = WorkerShared {
                trials: &trials,
                pairs: &pairs,
                tapers: Arc::clone(&tapers),
                plan: Arc::clone(&plan),
                input_gain: 1.0,
                state: &state,
                cancel: &cancel,
            };
            assert_eq!(accumulate(&shared, n_workers).unwrap(), 9);
            assert_eq!(state.merged().unwrap(), 9);
        }
    }

    #[test]
    fn cancelled_pool_merges_nothing_new() {
        let (trials, pairs, tapers, plan) = fixture(5);
        let state = AccumulationState::new(pairs.len(), 17);
        let cancel = AtomicBool::new(true);
        let shared = WorkerShared {
            trials: &trials,
            pairs: &pairs,
            tapers,
            plan,
            input_gain: 1.0,
            state: &state,
            cancel: &cancel,
        };
        assert_eq!(accumulate(&shared, 2).unwrap(), 0);
        assert_eq!(state.merged().unwrap(), 0);
    }

    #[test]
    fn task_compute_is_pure() {
        let (trials, pairs, tapers, plan) = fixture(1);
        let mut est = TrialSpectralEstimator::new(tapers, plan);
        let task = TrialComputeTask {
            index: 0,
            trial: &trials[0],
        };
        let a = task.compute(&mut est, &pairs);
        let b = task.compute(&mut est, &pairs);
        assert_eq!(a, b);
        assert_eq!(a.n_rows(), 3);
    }
}
