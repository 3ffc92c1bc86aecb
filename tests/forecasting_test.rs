use assert_matches::assert_matches;
use vitalsense::config::ForecastingConfig;
use vitalsense::ml::forecasting::{
    forecast, rollout, select_backend, train, DisabledBackend, ForecastBackend, SequenceModel,
    TrainingHistory, TrainingOutcome, TrainingParams,
};
use vitalsense::ServiceError;

/// Returns the last value of the window plus two
#[derive(Debug, Default)]
struct StepUp {
    history: TrainingHistory,
}

impl SequenceModel for StepUp {
    fn window_size(&self) -> usize {
        3
    }

    fn predict_next(&self, window: &[f64]) -> f64 {
        window[window.len() - 1] + 2.0
    }

    fn history(&self) -> &TrainingHistory {
        &self.history
    }
}

fn sine_series(len: usize) -> Vec<f64> {
    (0..len)
        .map(|i| 75.0 + 10.0 * (i as f64 * 0.3).sin())
        .collect()
}

#[test]
fn rollout_compounds_its_own_predictions() {
    let model = StepUp::default();
    let out = rollout(&model, &[1.0, 2.0, 3.0, 100.0, 5.0, 6.0], 3, 4).unwrap();
    // Each step builds on the previous prediction, not on observed data
    assert_eq!(out, vec![8.0, 10.0, 12.0, 14.0]);
}

#[test]
fn horizon_sets_output_length() {
    let model = StepUp::default();
    for horizon in [0, 1, 7, 25] {
        let out = rollout(&model, &[0.0; 5], 3, horizon).unwrap();
        assert_eq!(out.len(), horizon);
    }
}

#[test]
fn window_mismatch_is_rejected() {
    let model = StepUp::default();
    assert_matches!(
        rollout(&model, &[0.0; 10], 5, 2),
        Err(ServiceError::InvalidInput(_))
    );
}

#[test]
fn disabled_backend_reports_unavailable() {
    let backend = DisabledBackend;
    let outcome = backend
        .train(&sine_series(100), &TrainingParams::new(10, 2))
        .unwrap();
    assert_matches!(outcome, TrainingOutcome::Unavailable);
    assert!(outcome.into_model().is_none());
}

#[cfg(not(feature = "forecasting"))]
#[test]
fn compiled_out_build_answers_every_entry_point_with_unavailable() {
    assert!(!vitalsense::FORECASTING_COMPILED);
    assert_matches!(train(&sine_series(40), 5, 1), Ok(TrainingOutcome::Unavailable));
    let model = StepUp::default();
    assert_eq!(forecast(Some(&model), &[1.0, 2.0, 3.0], 3, 3).unwrap(), None);
    assert!(!select_backend(&ForecastingConfig::default()).is_available());
}

#[cfg(feature = "forecasting")]
mod recurrent {
    use super::*;

    #[test]
    fn short_series_is_insufficient_not_an_error() {
        let outcome = train(&sine_series(19), 10, 2).unwrap();
        assert_matches!(
            outcome,
            TrainingOutcome::InsufficientData {
                required: 20,
                available: 19
            }
        );
    }

    #[test]
    fn minimum_length_trains() {
        let outcome = train(&sine_series(20), 10, 1).unwrap();
        assert!(outcome.is_trained());
    }

    #[test]
    fn trained_model_forecasts_horizon_values() {
        let series = sine_series(120);
        let backend = select_backend(&ForecastingConfig::default());
        assert_eq!(backend.name(), "lstm");

        let params = TrainingParams {
            epochs: 5,
            hidden_units: 8,
            dense_units: 4,
            ..TrainingParams::new(10, 5)
        };
        let model = backend.train(&series, &params).unwrap().into_model().unwrap();
        assert_eq!(model.history().epochs.len(), 5);
        assert!(model.history().epochs[0].val_mae.is_some());

        let out = backend
            .forecast(Some(model.as_ref()), &series, 10, 12)
            .unwrap()
            .unwrap();
        assert_eq!(out.len(), 12);
        assert!(out.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn training_is_deterministic_for_a_seed() {
        let series = sine_series(60);
        let params = TrainingParams {
            epochs: 3,
            hidden_units: 6,
            dense_units: 4,
            ..TrainingParams::new(8, 3)
        };
        let backend = select_backend(&ForecastingConfig::default());
        let a = backend.train(&series, &params).unwrap().into_model().unwrap();
        let b = backend.train(&series, &params).unwrap().into_model().unwrap();
        assert_eq!(a.history(), b.history());
        assert_eq!(
            forecast(Some(a.as_ref()), &series, 8, 5).unwrap(),
            forecast(Some(b.as_ref()), &series, 8, 5).unwrap()
        );
    }

    #[test]
    fn non_finite_series_is_rejected() {
        let mut series = sine_series(40);
        series[5] = f64::NAN;
        assert_matches!(train(&series, 10, 1), Err(ServiceError::InvalidInput(_)));
    }
}
