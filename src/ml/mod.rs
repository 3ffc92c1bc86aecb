/*!
 * # Machine Learning Module
 *
 * Feature preprocessing, isolation-forest anomaly detection and sequence
 * forecasting over vital-sign data.
 *
 * Preprocessing, detection and the forecasting interface are always
 * compiled. The recurrent forecasting backend is only available when the
 * `forecasting` feature is enabled (on by default).
 */

/// Feature matrix construction and scalers
pub mod preprocessing;

/// Isolation forest model
pub mod isolation_forest;

/// Detection runs, metrics and ground-truth evaluation
pub mod anomaly_detection;

/// Sliding windows, backends and autoregressive rollout
pub mod forecasting;

/// LSTM network (requires `forecasting`)
#[cfg(feature = "forecasting")]
pub mod recurrent;

pub use anomaly_detection::{
    detect, detect_with_config, evaluate_against_ground_truth, label_records, AnomalyDetector,
    AnomalyLabel, DetectionMetrics, DetectionOutcome, GroundTruthEvaluation,
};
pub use forecasting::{
    build_windows, forecast, select_backend, train, ForecastBackend, SequenceModel,
    SequenceWindows, TrainingHistory, TrainingOutcome, TrainingParams,
};
pub use isolation_forest::IsolationForest;
pub use preprocessing::{preprocess, preprocess_records, MinMaxScaler, Preprocessed, StandardScaler};
