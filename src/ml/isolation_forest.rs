//! Isolation forest outlier model.
//!
//! Anomalies are few and different, so random axis-aligned splits isolate
//! them in fewer steps than normal points. Scores follow the usual
//! `2^(-E[h(x)] / c(psi))` normalisation: values near 1 are anomalous,
//! values well below 0.5 are normal.

use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::anomaly_detection::AnomalyDetector;
use crate::errors::ServiceError;

const EULER_GAMMA: f64 = 0.577_215_664_9;

/// Expected path length of an unsuccessful BST search over `n` points.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// One randomly grown isolation tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationTree {
    root: Node,
}

impl IsolationTree {
    fn grow(data: &Array2<f64>, rows: Vec<usize>, height_limit: usize, rng: &mut ChaCha8Rng) -> Self {
        Self {
            root: grow_node(data, rows, 0, height_limit, rng),
        }
    }

    /// Path length for one sample, with the leaf-size correction.
    pub fn path_length(&self, sample: ArrayView1<'_, f64>) -> f64 {
        let mut node = &self.root;
        let mut depth = 0usize;
        loop {
            match node {
                Node::Leaf { size } => return depth as f64 + average_path_length(*size),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if sample[*feature] < *threshold { left } else { right };
                    depth += 1;
                }
            }
        }
    }
}

fn grow_node(
    data: &Array2<f64>,
    rows: Vec<usize>,
    depth: usize,
    height_limit: usize,
    rng: &mut ChaCha8Rng,
) -> Node {
    if depth >= height_limit || rows.len() <= 1 {
        return Node::Leaf { size: rows.len() };
    }

    // Only features that still vary inside this node can split it
    let spreads: Vec<(usize, f64, f64)> = (0..data.ncols())
        .filter_map(|feature| {
            let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
                let v = data[[r, feature]];
                (lo.min(v), hi.max(v))
            });
            (hi > lo).then_some((feature, lo, hi))
        })
        .collect();

    if spreads.is_empty() {
        return Node::Leaf { size: rows.len() };
    }

    let (feature, lo, hi) = spreads[rng.gen_range(0..spreads.len())];
    let threshold = rng.gen_range(lo..hi);
    let (left, right): (Vec<usize>, Vec<usize>) =
        rows.into_iter().partition(|&r| data[[r, feature]] < threshold);

    Node::Split {
        feature,
        threshold,
        left: Box::new(grow_node(data, left, depth + 1, height_limit, rng)),
        right: Box::new(grow_node(data, right, depth + 1, height_limit, rng)),
    }
}

/// Ensemble of isolation trees with a contamination-derived threshold
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationForest {
    n_estimators: usize,
    max_samples: usize,
    contamination: f64,
    random_state: u64,
    trees: Vec<IsolationTree>,
    sample_size: usize,
    n_features: usize,
    threshold: f64,
}

impl IsolationForest {
    pub fn new(contamination: f64, random_state: u64) -> Result<Self, ServiceError> {
        if !contamination.is_finite() || contamination <= 0.0 || contamination >= 1.0 {
            return Err(ServiceError::InvalidInput(format!(
                "contamination must be strictly between 0 and 1, got {}",
                contamination
            )));
        }
        Ok(Self {
            n_estimators: 100,
            max_samples: 256,
            contamination,
            random_state,
            trees: Vec::new(),
            sample_size: 0,
            n_features: 0,
            threshold: f64::INFINITY,
        })
    }

    pub fn with_estimators(mut self, n_estimators: usize) -> Self {
        self.n_estimators = n_estimators.max(1);
        self
    }

    pub fn with_max_samples(mut self, max_samples: usize) -> Self {
        self.max_samples = max_samples.max(2);
        self
    }

    pub fn contamination(&self) -> f64 {
        self.contamination
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    pub fn n_estimators(&self) -> usize {
        self.n_estimators
    }

    fn ensure_fitted(&self, x: &Array2<f64>) -> Result<(), ServiceError> {
        if !self.is_fitted() {
            return Err(ServiceError::InvalidInput(
                "isolation forest has not been fitted".to_string(),
            ));
        }
        if x.ncols() != self.n_features {
            return Err(ServiceError::InvalidInput(format!(
                "model expects {} features, got {}",
                self.n_features,
                x.ncols()
            )));
        }
        Ok(())
    }

    fn raw_scores(&self, x: &Array2<f64>) -> Array1<f64> {
        let norm = average_path_length(self.sample_size);
        let norm = if norm > 0.0 { norm } else { 1.0 };
        let trees = self.trees.len() as f64;
        x.rows()
            .into_iter()
            .map(|row| {
                let mean_depth =
                    self.trees.iter().map(|t| t.path_length(row)).sum::<f64>() / trees;
                2f64.powf(-mean_depth / norm)
            })
            .collect()
    }
}

impl AnomalyDetector for IsolationForest {
    fn fit(&mut self, x: &Array2<f64>) -> Result<(), ServiceError> {
        let n = x.nrows();
        if n == 0 || x.ncols() == 0 {
            return Err(ServiceError::InvalidInput(
                "cannot fit an isolation forest on an empty matrix".to_string(),
            ));
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(ServiceError::InvalidInput(
                "feature matrix contains non-finite values".to_string(),
            ));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
        let psi = self.max_samples.min(n);
        let height_limit = if psi > 1 {
            (psi as f64).log2().ceil() as usize
        } else {
            0
        };

        self.trees = (0..self.n_estimators)
            .map(|_| {
                let rows = index::sample(&mut rng, n, psi).into_vec();
                IsolationTree::grow(x, rows, height_limit, &mut rng)
            })
            .collect();
        self.sample_size = psi;
        self.n_features = x.ncols();

        let mut scores = self.raw_scores(x).to_vec();
        scores.sort_by(|a, b| a.total_cmp(b));
        self.threshold = percentile(&scores, 100.0 * (1.0 - self.contamination));

        debug!(
            trees = self.trees.len(),
            sample_size = psi,
            threshold = self.threshold,
            "Fitted isolation forest"
        );
        Ok(())
    }

    fn score_samples(&self, x: &Array2<f64>) -> Result<Array1<f64>, ServiceError> {
        self.ensure_fitted(x)?;
        Ok(self.raw_scores(x))
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<i32>, ServiceError> {
        let scores = self.score_samples(x)?;
        Ok(scores.mapv(|s| if s > self.threshold { -1 } else { 1 }))
    }

    fn threshold(&self) -> f64 {
        self.threshold
    }
}

/// Linear-interpolated percentile of already sorted values.
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    match sorted.len() {
        0 => f64::INFINITY,
        1 => sorted[0],
        len => {
            let rank = (pct / 100.0).clamp(0.0, 1.0) * (len - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let frac = rank - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn average_path_length_small_cases() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        assert!((average_path_length(256) - 10.244).abs() < 0.01);
    }

    #[test]
    fn percentile_interpolates() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&v, 50.0), 3.0);
        assert_eq!(percentile(&v, 100.0), 5.0);
        assert!((percentile(&v, 95.0) - 4.8).abs() < 1e-12);
    }

    #[test]
    fn isolates_obvious_outlier() {
        let mut rows: Vec<[f64; 2]> = (0..60)
            .map(|i| [(i % 10) as f64 * 0.1, (i / 10) as f64 * 0.1])
            .collect();
        rows.push([25.0, -25.0]);
        let x = Array2::from_shape_vec(
            (rows.len(), 2),
            rows.iter().flat_map(|r| r.iter().copied()).collect(),
        )
        .unwrap();

        let mut forest = IsolationForest::new(0.05, 42).unwrap();
        let labels = forest.fit_predict(&x).unwrap();
        assert_eq!(labels[labels.len() - 1], -1);

        let scores = forest.score_samples(&x).unwrap();
        let outlier = scores[scores.len() - 1];
        assert!(scores.iter().take(60).all(|&s| s < outlier));
    }

    #[test]
    fn rejects_unfitted_and_mismatched_input() {
        let forest = IsolationForest::new(0.1, 1).unwrap();
        assert!(forest.predict(&array![[1.0, 2.0]]).is_err());

        let mut forest = IsolationForest::new(0.1, 1).unwrap();
        forest.fit(&array![[1.0, 2.0], [2.0, 3.0], [3.0, 1.0]]).unwrap();
        assert!(forest.predict(&array![[1.0]]).is_err());
    }

    #[test]
    fn rejects_bad_contamination() {
        assert!(IsolationForest::new(0.0, 1).is_err());
        assert!(IsolationForest::new(1.0, 1).is_err());
        assert!(IsolationForest::new(f64::NAN, 1).is_err());
    }
}
