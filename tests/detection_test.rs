use assert_matches::assert_matches;
use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use vitalsense::config::DetectionConfig;
use vitalsense::ml::{
    detect, detect_with_config, evaluate_against_ground_truth, label_records, preprocess,
    preprocess_records, AnomalyLabel,
};
use vitalsense::models::VitalsSnapshot;
use vitalsense::{ServiceError, VitalGenerator};

fn random_matrix(rows: usize, cols: usize, seed: u64) -> Array2<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    Array2::from_shape_simple_fn((rows, cols), || rng.gen_range(-1.0..1.0))
}

#[test]
fn thousand_rows_flag_about_contamination() {
    let matrix = random_matrix(1000, 4, 11);
    let outcome = detect(&matrix, 0.05).unwrap();
    let m = &outcome.metrics;

    assert_eq!(m.total_samples, 1000);
    assert_eq!(m.anomalies_detected + m.normal_samples, 1000);
    assert!((m.anomaly_percentage - 5.0).abs() <= 0.5, "{}", m.anomaly_percentage);
    assert_eq!(m.contamination, 0.05);
    assert_eq!(m.holdout_samples, Some(200));
}

#[test]
fn detection_is_reproducible() {
    let matrix = random_matrix(400, 5, 3);
    let first = detect(&matrix, 0.05).unwrap();
    let second = detect(&matrix, 0.05).unwrap();
    assert_eq!(first.labels, second.labels);
    assert_eq!(first.metrics, second.metrics);
}

#[test]
fn different_seeds_may_differ_but_stay_valid() {
    let matrix = random_matrix(300, 3, 9);
    let config = DetectionConfig {
        random_state: 7,
        ..DetectionConfig::default()
    };
    let outcome = detect_with_config(&matrix, &config).unwrap();
    assert_eq!(outcome.labels.len(), 300);
}

#[test]
fn percentage_is_rounded_to_two_decimals() {
    let matrix = random_matrix(333, 3, 21);
    let pct = detect(&matrix, 0.1).unwrap().metrics.anomaly_percentage;
    assert_eq!((pct * 100.0).round() / 100.0, pct);
}

#[test]
fn invalid_contamination_is_rejected() {
    let matrix = random_matrix(20, 2, 1);
    assert_matches!(detect(&matrix, 0.0), Err(ServiceError::InvalidInput(_)));
    assert_matches!(detect(&matrix, 1.5), Err(ServiceError::InvalidInput(_)));
}

#[test]
fn missing_vital_columns_fail_loudly() {
    let rows: Vec<VitalsSnapshot> = serde_json::from_str(
        r#"[{"user_id": "u1", "activity_level": "low"}, {"user_id": "u2"}]"#,
    )
    .unwrap();
    assert_matches!(preprocess(&rows), Err(ServiceError::NoFeatures));
}

#[test]
fn simulated_pipeline_finds_injected_anomalies() {
    let series = VitalGenerator::new()
        .with_seed(2024)
        .generate_multi_user_series(3, 300, 0.05)
        .unwrap();
    let prepared = preprocess_records(&series.records).unwrap();
    assert_eq!(
        prepared.feature_names(),
        vec![
            "heart_rate",
            "blood_oxygen",
            "temperature",
            "respiration_rate",
            "activity_encoded"
        ]
    );

    let outcome = detect(&prepared.matrix, 0.05).unwrap();
    let eval = evaluate_against_ground_truth(&outcome.labels, &series.ground_truth()).unwrap();
    // Injected minutes sit far outside the normal band
    assert!(eval.recall > 0.4, "recall {}", eval.recall);
    assert!(eval.precision > 0.4, "precision {}", eval.precision);

    let labeled = label_records(&series.records, &outcome.labels).unwrap();
    let flagged = labeled.iter().filter(|r| r.is_anomaly).count();
    assert_eq!(flagged, outcome.metrics.anomalies_detected);
    assert_eq!(
        outcome
            .labels
            .iter()
            .filter(|l| **l == AnomalyLabel::Anomaly)
            .count(),
        flagged
    );
}
