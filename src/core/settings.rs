use std::num::NonZeroUsize;

use crate::core::pairs::PairSelection;
use crate::core::taper::TaperKind;
use crate::core::trial::Trial;

/// Input to one connectivity invocation.
///
/// Trials are owned here and only read by the engine.
#[derive(Clone, Debug)]
pub struct ConnectivitySettings {
    pub trials: Vec<Trial>,
    /// Hz
    pub sampling_rate: f64,
    /// FFT length; `None` uses the trial sample count.
    pub fft_len: Option<usize>,
    pub taper: TaperKind,
    pub pairs: PairSelection,
    /// Worker threads; `None` uses the available hardware parallelism.
    pub workers: Option<NonZeroUsize>,
    /// Node labels, one per channel; missing labels default to `ch{index}`.
    pub node_labels: Vec<String>,
}

impl ConnectivitySettings {
    pub fn new(trials: Vec<Trial>, sampling_rate: f64) -> Self {
        Self {
            trials,
            sampling_rate,
            fft_len: None,
            taper: TaperKind::default(),
            pairs: PairSelection::default(),
            workers: None,
            node_labels: Vec::new(),
        }
    }

    pub fn with_fft_len(mut self, fft_len: usize) -> Self {
        self.fft_len = Some(fft_len);
        self
    }

    pub fn with_taper(mut self, taper: TaperKind) -> Self {
        self.taper = taper;
        self
    }

    pub fn with_pairs(mut self, pairs: PairSelection) -> Self {
        self.pairs = pairs;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = NonZeroUsize::new(workers);
        self
    }

    pub fn with_node_labels<S: Into<String>>(mut self, labels: impl IntoIterator<Item = S>) -> Self {
        self.node_labels = labels.into_iter().map(Into::into).collect();
        self
    }

    /// Append one trial (e.g. from a streaming collaborator).
    pub fn push_trial(&mut self, trial: Trial) {
        self.trials.push(trial);
    }

    pub fn n_trials(&self) -> usize {
        self.trials.len()
    }

    pub(crate) fn node_label(&self, index: usize) -> String {
        self.node_labels
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("ch{index}"))
    }

    pub(crate) fn worker_count(&self) -> usize {
        self.workers
            .or_else(|| std::thread::available_parallelism().ok())
            .map_or(1, NonZeroUsize::get)
    }
}
