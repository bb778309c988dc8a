//! Connectivity network: nodes (channels) and one weighted edge per pair.
//!
//! Edge weights are indexed by frequency bin. A `FrequencyBand` collapses
//! them to one value by averaging the bins whose center lies in the band.

use serde::Serialize;

use crate::core::fft::bin_freqs_hz;
use crate::core::metric::Metric;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Node {
    pub index: usize,
    pub label: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Edge {
    pub from: usize,
    pub to: usize,
    /// One value per frequency bin.
    pub weights: Vec<f64>,
}

impl Edge {
    #[inline]
    pub fn connects(&self, a: usize, b: usize) -> bool {
        (self.from == a && self.to == b) || (self.from == b && self.to == a)
    }

    /// Mean weight over `bins`; 0 for an empty range.
    pub fn mean_weight(&self, bins: std::ops::Range<usize>) -> f64 {
        let end = bins.end.min(self.weights.len());
        let start = bins.start.min(end);
        let slice = &self.weights[start..end];
        if slice.is_empty() {
            0.0
        } else {
            slice.iter().sum::<f64>() / slice.len() as f64
        }
    }
}

/// Inclusive frequency range in Hz.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct FrequencyBand {
    pub min_hz: f64,
    pub max_hz: f64,
}

impl FrequencyBand {
    pub fn new(min_hz: f64, max_hz: f64) -> Self {
        Self { min_hz, max_hz }
    }

    #[inline]
    pub fn contains(&self, hz: f64) -> bool {
        hz >= self.min_hz && hz <= self.max_hz
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Network {
    metric: Metric,
    sampling_rate: f64,
    fft_len: usize,
    n_trials: usize,
    freqs_hz: Vec<f64>,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

impl Network {
    pub fn new(
        metric: Metric,
        sampling_rate: f64,
        fft_len: usize,
        n_trials: usize,
        nodes: Vec<Node>,
        edges: Vec<Edge>,
    ) -> Self {
        Self {
            metric,
            sampling_rate,
            fft_len,
            n_trials,
            freqs_hz: bin_freqs_hz(sampling_rate, fft_len),
            nodes,
            edges,
        }
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    pub fn fft_len(&self) -> usize {
        self.fft_len
    }

    pub fn n_trials(&self) -> usize {
        self.n_trials
    }

    /// Bin → Hz mapping shared by every edge.
    pub fn freqs_hz(&self) -> &[f64] {
        &self.freqs_hz
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Edge between `a` and `b` in either orientation.
    pub fn edge(&self, a: usize, b: usize) -> Option<&Edge> {
        self.edges.iter().find(|e| e.connects(a, b))
    }

    /// Contiguous bin range whose centers fall in `band` (all bins if `None`).
    pub fn band_bins(&self, band: Option<FrequencyBand>) -> std::ops::Range<usize> {
        match band {
            None => 0..self.freqs_hz.len(),
            Some(band) => {
                let start = self
                    .freqs_hz
                    .iter()
                    .position(|&f| band.contains(f))
                    .unwrap_or(self.freqs_hz.len());
                let end = self.freqs_hz[start..]
                    .iter()
                    .position(|&f| !band.contains(f))
                    .map_or(self.freqs_hz.len(), |off| start + off);
                start..end
            }
        }
    }

    /// Band-collapsed weight of the `(a, b)` edge.
    pub fn band_weight(&self, a: usize, b: usize, band: Option<FrequencyBand>) -> Option<f64> {
        let bins = self.band_bins(band);
        self.edge(a, b).map(|e| e.mean_weight(bins))
    }

    /// Symmetric node × node matrix of band-collapsed weights; pairs that
    /// were not evaluated and the diagonal are 0.
    pub fn connectivity_matrix(&self, band: Option<FrequencyBand>) -> Vec<Vec<f64>> {
        let n = self.nodes.len();
        let bins = self.band_bins(band);
        let mut m = vec![vec![0.0; n]; n];
        for e in &self.edges {
            let w = e.mean_weight(bins.clone());
            m[e.from][e.to] = w;
            m[e.to][e.from] = w;
        }
        m
    }

    /// `(min, max)` of band-collapsed edge weights, `None` without edges.
    pub fn min_max_weights(&self, band: Option<FrequencyBand>) -> Option<(f64, f64)> {
        let bins = self.band_bins(band);
        self.edges
            .iter()
            .map(|e| e.mean_weight(bins.clone()))
            .fold(None, |acc, w| match acc {
                None => Some((w, w)),
                Some((lo, hi)) => Some((lo.min(w), hi.max(w))),
            })
    }

    /// Edges whose band-collapsed weight is at least `threshold`.
    pub fn edges_above(&self, threshold: f64, band: Option<FrequencyBand>) -> Vec<&Edge> {
        let bins = self.band_bins(band);
        self.edges
            .iter()
            .filter(|e| e.mean_weight(bins.clone()) >= threshold)
            .collect()
    }

    /// Number of edges at `node` that pass `threshold`.
    pub fn node_degree(&self, node: usize, threshold: f64, band: Option<FrequencyBand>) -> usize {
        self.edges_above(threshold, band)
            .into_iter()
            .filter(|e| e.from == node || e.to == node)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn toy() -> Network {
        let nodes = (0..3)
            .map(|index| Node {
                index,
                label: format!("ch{index}"),
            })
            .collect();
        // fs = 8 Hz, n_fft = 8: bins at 0, 1, 2, 3, 4 Hz.
        let edges = vec![
            Edge {
                from: 0,
                to: 1,
                weights: vec![0.0, 0.2, 0.8, 0.6, 0.0],
            },
            Edge {
                from: 1,
                to: 2,
                weights: vec![0.0, 0.1, 0.1, 0.1, 0.0],
            },
        ];
        Network::new(Metric::DebiasedSquaredWpli, 8.0, 8, 10, nodes, edges)
    }

    #[test]
    fn edge_lookup_is_orientation_free() {
        let net = toy();
        assert_eq!(net.edge(1, 0), net.edge(0, 1));
        assert!(net.edge(0, 2).is_none());
        assert_eq!(net.freqs_hz(), &[0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(net.n_trials(), 10);
    }

    #[test]
    fn band_collapses_by_mean() {
        let net = toy();
        let band = Some(FrequencyBand::new(1.5, 3.0));
        assert_eq!(net.band_bins(band), 2..4);
        assert_relative_eq!(net.band_weight(0, 1, band).unwrap(), 0.7);
        assert_relative_eq!(net.band_weight(1, 0, None).unwrap(), 0.32);
        // Band outside the spectrum collapses to 0.
        let empty = Some(FrequencyBand::new(10.0, 20.0));
        assert_eq!(net.band_bins(empty), 5..5);
        assert_eq!(net.band_weight(0, 1, empty), Some(0.0));
    }

    #[test]
    fn matrix_is_symmetric_with_zero_diagonal() {
        let net = toy();
        let m = net.connectivity_matrix(Some(FrequencyBand::new(2.0, 2.0)));
        assert_eq!(m.len(), 3);
        for i in 0..3 {
            assert_eq!(m[i][i], 0.0);
            for j in 0..3 {
                assert_eq!(m[i][j], m[j][i]);
            }
        }
        assert_relative_eq!(m[0][1], 0.8);
        assert_relative_eq!(m[2][1], 0.1);
        assert_eq!(m[0][2], 0.0);
    }

    #[test]
    fn thresholds_and_degrees() {
        let net = toy();
        let band = Some(FrequencyBand::new(1.0, 3.0));
        let (lo, hi) = net.min_max_weights(band).unwrap();
        assert_relative_eq!(lo, 0.1);
        assert_relative_eq!(hi, 1.6 / 3.0);
        assert_eq!(net.edges_above(0.5, band).len(), 1);
        assert_eq!(net.node_degree(1, 0.05, band), 2);
        assert_eq!(net.node_degree(0, 0.6, band), 0);
    }

    #[test]
    fn serializes_to_json() {
        let json = serde_json::to_value(toy()).unwrap();
        assert_eq!(json["metric"], "debiased-squared-wpli");
        assert_eq!(json["edges"][0]["weights"][2], 0.8);
        assert_eq!(json["nodes"][2]["label"], "ch2");
    }
}
