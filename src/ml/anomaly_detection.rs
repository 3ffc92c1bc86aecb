use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::isolation_forest::IsolationForest;
use crate::config::DetectionConfig;
use crate::errors::ServiceError;

/// Common interface for unsupervised outlier models.
///
/// Labels use the `-1` (anomaly) / `1` (normal) convention.
pub trait AnomalyDetector: Send + Sync {
    /// Fit the detector on training data
    fn fit(&mut self, x: &Array2<f64>) -> Result<(), ServiceError>;

    /// Anomaly scores, higher means more anomalous
    fn score_samples(&self, x: &Array2<f64>) -> Result<Array1<f64>, ServiceError>;

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<i32>, ServiceError>;

    /// Fit and predict in one step
    fn fit_predict(&mut self, x: &Array2<f64>) -> Result<Array1<i32>, ServiceError> {
        self.fit(x)?;
        self.predict(x)
    }

    /// Score cut-off above which a sample is labelled anomalous
    fn threshold(&self) -> f64;
}

/// Per-row detector output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum AnomalyLabel {
    Anomaly,
    Normal,
}

impl AnomalyLabel {
    pub fn is_anomaly(self) -> bool {
        self == AnomalyLabel::Anomaly
    }
}

impl From<AnomalyLabel> for i32 {
    fn from(label: AnomalyLabel) -> Self {
        match label {
            AnomalyLabel::Anomaly => -1,
            AnomalyLabel::Normal => 1,
        }
    }
}

impl TryFrom<i32> for AnomalyLabel {
    type Error = ServiceError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(AnomalyLabel::Anomaly),
            1 => Ok(AnomalyLabel::Normal),
            other => Err(ServiceError::InvalidInput(format!(
                "anomaly label must be -1 or 1, got {}",
                other
            ))),
        }
    }
}

/// Summary of one detection run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionMetrics {
    pub total_samples: usize,
    pub anomalies_detected: usize,
    pub normal_samples: usize,
    /// Rounded to two decimals
    pub anomaly_percentage: f64,
    pub contamination: f64,
    /// Rows held out for evaluation, when a split was made
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holdout_samples: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holdout_anomaly_percentage: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct DetectionOutcome {
    pub labels: Vec<AnomalyLabel>,
    pub scores: Array1<f64>,
    /// Fitted on the full input
    pub model: IsolationForest,
    pub metrics: DetectionMetrics,
}

/// Runs detection with default settings and the given contamination.
pub fn detect(matrix: &Array2<f64>, contamination: f64) -> Result<DetectionOutcome, ServiceError> {
    let config = DetectionConfig {
        contamination,
        ..DetectionConfig::default()
    };
    detect_with_config(matrix, &config)
}

/// Fits an isolation forest over `matrix` and labels every row.
///
/// Above `min_samples_for_holdout` rows a seeded shuffle holds out a
/// fraction for the hold-out metrics. The returned labels always come from
/// a separate fit over the whole matrix.
#[instrument(skip(matrix, config), fields(rows = matrix.nrows(), contamination = config.contamination))]
pub fn detect_with_config(
    matrix: &Array2<f64>,
    config: &DetectionConfig,
) -> Result<DetectionOutcome, ServiceError> {
    let total = matrix.nrows();
    if total == 0 {
        return Err(ServiceError::InvalidInput(
            "cannot detect anomalies in an empty matrix".to_string(),
        ));
    }

    let new_forest = || -> Result<IsolationForest, ServiceError> {
        Ok(IsolationForest::new(config.contamination, config.random_state)?
            .with_estimators(config.n_estimators)
            .with_max_samples(config.max_samples))
    };

    let (holdout_samples, holdout_anomaly_percentage) = if total > config.min_samples_for_holdout {
        let (train, test) = holdout_split(matrix, config.holdout_fraction, config.random_state);
        let mut forest = new_forest()?;
        forest.fit(&train)?;
        let flagged = forest.predict(&test)?.iter().filter(|&&l| l == -1).count();
        (Some(test.nrows()), Some(percentage(flagged, test.nrows())))
    } else {
        (None, None)
    };

    let mut model = new_forest()?;
    let raw = model.fit_predict(matrix)?;
    let scores = model.score_samples(matrix)?;
    let labels = raw
        .iter()
        .map(|&l| AnomalyLabel::try_from(l))
        .collect::<Result<Vec<_>, _>>()?;

    let anomalies = labels.iter().filter(|l| l.is_anomaly()).count();
    let metrics = DetectionMetrics {
        total_samples: total,
        anomalies_detected: anomalies,
        normal_samples: total - anomalies,
        anomaly_percentage: percentage(anomalies, total),
        contamination: config.contamination,
        holdout_samples,
        holdout_anomaly_percentage,
    };

    info!(
        total = metrics.total_samples,
        anomalies = metrics.anomalies_detected,
        percentage = metrics.anomaly_percentage,
        "Anomaly detection complete"
    );

    Ok(DetectionOutcome {
        labels,
        scores,
        model,
        metrics,
    })
}

fn holdout_split(matrix: &Array2<f64>, fraction: f64, seed: u64) -> (Array2<f64>, Array2<f64>) {
    let n = matrix.nrows();
    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(&mut ChaCha8Rng::seed_from_u64(seed));

    let test_len = ((n as f64) * fraction).ceil() as usize;
    let test_len = test_len.clamp(1, n.saturating_sub(1).max(1));
    let (test_idx, train_idx) = order.split_at(test_len);
    (
        matrix.select(Axis(0), train_idx),
        matrix.select(Axis(0), test_idx),
    )
}

fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let pct = part as f64 / total as f64 * 100.0;
    (pct * 100.0).round() / 100.0
}

/// Confusion counts and derived scores against injected ground truth
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundTruthEvaluation {
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Compares labels with a known anomaly mask. Undefined ratios are 0.
pub fn evaluate_against_ground_truth(
    labels: &[AnomalyLabel],
    truth: &[bool],
) -> Result<GroundTruthEvaluation, ServiceError> {
    if labels.len() != truth.len() {
        return Err(ServiceError::InvalidInput(format!(
            "{} labels but {} ground-truth flags",
            labels.len(),
            truth.len()
        )));
    }

    let (mut tp, mut fp, mut tn, mut fn_) = (0, 0, 0, 0);
    for (label, &actual) in labels.iter().zip(truth) {
        match (label.is_anomaly(), actual) {
            (true, true) => tp += 1,
            (true, false) => fp += 1,
            (false, false) => tn += 1,
            (false, true) => fn_ += 1,
        }
    }

    let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_);
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    Ok(GroundTruthEvaluation {
        true_positives: tp,
        false_positives: fp,
        true_negatives: tn,
        false_negatives: fn_,
        precision,
        recall,
        f1,
    })
}

/// A record joined with its detector label
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabeledRecord<T> {
    #[serde(flatten)]
    pub record: T,
    pub is_anomaly: bool,
}

/// Joins labels to records by position.
pub fn label_records<T: Clone>(
    records: &[T],
    labels: &[AnomalyLabel],
) -> Result<Vec<LabeledRecord<T>>, ServiceError> {
    if records.len() != labels.len() {
        return Err(ServiceError::InvalidInput(format!(
            "{} records but {} labels",
            records.len(),
            labels.len()
        )));
    }
    Ok(records
        .iter()
        .zip(labels)
        .map(|(record, label)| LabeledRecord {
            record: record.clone(),
            is_anomaly: label.is_anomaly(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn grid(n: usize) -> Array2<f64> {
        Array2::from_shape_fn((n, 3), |(i, j)| ((i * 31 + j * 17) % 97) as f64 / 10.0)
    }

    #[test]
    fn small_inputs_skip_holdout() {
        let outcome = detect(&grid(40), 0.1).unwrap();
        assert_eq!(outcome.labels.len(), 40);
        assert_eq!(outcome.metrics.holdout_samples, None);
        assert_eq!(
            outcome.metrics.anomalies_detected + outcome.metrics.normal_samples,
            40
        );
    }

    #[test]
    fn larger_inputs_report_holdout() {
        let outcome = detect(&grid(100), 0.05).unwrap();
        assert_eq!(outcome.metrics.holdout_samples, Some(20));
        assert!(outcome.metrics.holdout_anomaly_percentage.is_some());
        assert!(outcome.model.is_fitted());
    }

    #[test]
    fn label_conversion() {
        assert_eq!(i32::from(AnomalyLabel::Anomaly), -1);
        assert_eq!(AnomalyLabel::try_from(1).unwrap(), AnomalyLabel::Normal);
        assert!(AnomalyLabel::try_from(0).is_err());
        assert_eq!(serde_json::to_string(&AnomalyLabel::Anomaly).unwrap(), "-1");
    }

    #[test]
    fn ground_truth_scores() {
        use AnomalyLabel::*;
        let labels = [Anomaly, Anomaly, Normal, Normal];
        let truth = [true, false, true, false];
        let eval = evaluate_against_ground_truth(&labels, &truth).unwrap();
        assert_eq!(eval.true_positives, 1);
        assert_eq!(eval.false_positives, 1);
        assert_eq!(eval.false_negatives, 1);
        assert_eq!(eval.true_negatives, 1);
        assert_eq!(eval.precision, 0.5);
        assert_eq!(eval.recall, 0.5);
        assert_eq!(eval.f1, 0.5);

        assert_matches!(
            evaluate_against_ground_truth(&labels, &truth[..2]),
            Err(ServiceError::InvalidInput(_))
        );
    }

    #[test]
    fn labels_join_by_position() {
        let joined = label_records(&["a", "b"], &[AnomalyLabel::Normal, AnomalyLabel::Anomaly]).unwrap();
        assert!(!joined[0].is_anomaly);
        assert!(joined[1].is_anomaly);
        assert!(label_records(&["a"], &[]).is_err());
    }
}
