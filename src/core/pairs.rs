//! Channel-pair enumeration.
//!
//! The pair list is fixed before any trial is dispatched; accumulator rows
//! follow its order. Pairs are stored as `(i, j)` with `i < j`, sorted by
//! seed `i` so one trial can walk seed → targets.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{ConnectivityError, Result};

/// Which channel pairs an invocation evaluates.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PairSelection {
    /// Every unordered pair.
    #[default]
    AllPairs,
    /// Each seed channel against every other channel.
    Seeds(Vec<usize>),
    /// Exactly these pairs, in either orientation.
    Explicit(Vec<(usize, usize)>),
}

/// Normalized, deduplicated pair list plus a seed → rows index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelPairs {
    n_channels: usize,
    pairs: Vec<(usize, usize)>,
    /// `(seed, first_row, row_count)` over contiguous runs of `pairs`.
    seed_runs: Vec<(usize, usize, usize)>,
}

impl ChannelPairs {
    pub fn resolve(selection: &PairSelection, n_channels: usize) -> Result<Self> {
        let mut set = BTreeSet::new();
        match selection {
            PairSelection::AllPairs => {
                for i in 0..n_channels {
                    for j in i + 1..n_channels {
                        set.insert((i, j));
                    }
                }
            }
            PairSelection::Seeds(seeds) => {
                for &seed in seeds {
                    if seed >= n_channels {
                        return Err(ConnectivityError::PairOutOfRange(seed, seed, n_channels));
                    }
                    for other in (0..n_channels).filter(|&c| c != seed) {
                        set.insert((seed.min(other), seed.max(other)));
                    }
                }
            }
            PairSelection::Explicit(pairs) => {
                for &(a, b) in pairs {
                    if a >= n_channels || b >= n_channels {
                        return Err(ConnectivityError::PairOutOfRange(a, b, n_channels));
                    }
                    if a == b {
                        return Err(ConnectivityError::SelfPair(a));
                    }
                    set.insert((a.min(b), a.max(b)));
                }
            }
        }

        if set.is_empty() {
            return Err(ConnectivityError::NoPairs);
        }
        let pairs: Vec<(usize, usize)> = set.into_iter().collect();

        let mut seed_runs: Vec<(usize, usize, usize)> = Vec::new();
        for (row, &(i, _)) in pairs.iter().enumerate() {
            match seed_runs.last_mut() {
                Some((seed, _, count)) if *seed == i => *count += 1,
                _ => seed_runs.push((i, row, 1)),
            }
        }

        Ok(Self {
            n_channels,
            pairs,
            seed_runs,
        })
    }

    #[inline]
    pub fn n_channels(&self) -> usize {
        self.n_channels
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn pairs(&self) -> &[(usize, usize)] {
        &self.pairs
    }

    /// Row of the accumulator holding `(a, b)` in either orientation.
    pub fn row_of(&self, a: usize, b: usize) -> Option<usize> {
        let key = (a.min(b), a.max(b));
        self.pairs.binary_search(&key).ok()
    }

    /// `(seed, first_row, rows)` for each seed; `rows` are the seed's pairs
    /// in accumulator order.
    pub fn seeds(&self) -> impl Iterator<Item = (usize, usize, &[(usize, usize)])> {
        self.seed_runs
            .iter()
            .map(|&(seed, first, count)| (seed, first, &self.pairs[first..first + count]))
    }

    /// Channels that appear in at least one pair.
    pub fn involved_channels(&self) -> Vec<bool> {
        let mut used = vec![false; self.n_channels];
        for &(i, j) in &self.pairs {
            used[i] = true;
            used[j] = true;
        }
        used
    }
}
