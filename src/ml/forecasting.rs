//! Sliding-window sequence forecasting.
//!
//! A backend is picked once through [`select_backend`]. With the
//! `forecasting` feature compiled in and enabled in config this is the
//! recurrent (LSTM) backend; otherwise [`DisabledBackend`] answers every
//! call with an explicit "unavailable" result.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, instrument, warn};

use crate::config::ForecastingConfig;
use crate::errors::ServiceError;

/// Extra observations required beyond one window before training.
pub const MIN_EXTRA_SAMPLES: usize = 10;

/// Share of windows used for training; the rest validate, in time order.
pub const TRAIN_FRACTION: f64 = 0.8;

/// Input windows and the value that follows each
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SequenceWindows {
    pub windows: Vec<Vec<f64>>,
    pub targets: Vec<f64>,
}

impl SequenceWindows {
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Splits at `fraction` of the windows without reordering.
    pub fn split_temporal(&self, fraction: f64) -> (SequenceWindows, SequenceWindows) {
        let cut = ((self.len() as f64) * fraction).floor() as usize;
        let cut = cut.min(self.len());
        (
            SequenceWindows {
                windows: self.windows[..cut].to_vec(),
                targets: self.targets[..cut].to_vec(),
            },
            SequenceWindows {
                windows: self.windows[cut..].to_vec(),
                targets: self.targets[cut..].to_vec(),
            },
        )
    }
}

/// Window `i` is `series[i..i + window_size]`, its target `series[i + window_size]`.
/// Empty when the series is not longer than one window.
pub fn build_windows(series: &[f64], window_size: usize) -> SequenceWindows {
    if window_size == 0 || series.len() <= window_size {
        return SequenceWindows::default();
    }
    let (windows, targets) = series
        .windows(window_size + 1)
        .map(|w| (w[..window_size].to_vec(), w[window_size]))
        .unzip();
    SequenceWindows { windows, targets }
}

/// Loss and error for one training epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    /// Mean squared error on the training windows
    pub loss: f64,
    /// Mean absolute error on the training windows
    pub mae: f64,
    pub val_loss: Option<f64>,
    pub val_mae: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochMetrics>,
}

impl TrainingHistory {
    pub fn last(&self) -> Option<&EpochMetrics> {
        self.epochs.last()
    }
}

/// Hyper-parameters for one training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingParams {
    pub window_size: usize,
    pub epochs: usize,
    pub hidden_units: usize,
    pub dense_units: usize,
    pub learning_rate: f64,
    pub batch_size: usize,
    pub seed: u64,
}

impl TrainingParams {
    pub fn new(window_size: usize, epochs: usize) -> Self {
        Self {
            window_size,
            epochs,
            ..Self::from(&ForecastingConfig::default())
        }
    }
}

impl From<&ForecastingConfig> for TrainingParams {
    fn from(config: &ForecastingConfig) -> Self {
        Self {
            window_size: config.window_size,
            epochs: config.epochs,
            hidden_units: config.hidden_units,
            dense_units: config.dense_units,
            learning_rate: config.learning_rate,
            batch_size: config.batch_size,
            seed: config.seed,
        }
    }
}

/// A fitted one-step-ahead predictor over raw (unscaled) values
pub trait SequenceModel: Send + Sync + fmt::Debug {
    fn window_size(&self) -> usize;

    fn predict_next(&self, window: &[f64]) -> f64;

    fn history(&self) -> &TrainingHistory;
}

/// Result of a training request
#[derive(Debug)]
pub enum TrainingOutcome {
    Trained(Box<dyn SequenceModel>),
    /// Series too short; nothing was trained
    InsufficientData { required: usize, available: usize },
    /// No forecasting backend in this build or configuration
    Unavailable,
}

impl TrainingOutcome {
    pub fn is_trained(&self) -> bool {
        matches!(self, TrainingOutcome::Trained(_))
    }

    pub fn into_model(self) -> Option<Box<dyn SequenceModel>> {
        match self {
            TrainingOutcome::Trained(model) => Some(model),
            _ => None,
        }
    }
}

/// Training and prediction strategy
pub trait ForecastBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_available(&self) -> bool;

    fn train(&self, series: &[f64], params: &TrainingParams)
        -> Result<TrainingOutcome, ServiceError>;

    /// `Ok(None)` when no model is given or the backend is unavailable.
    fn forecast(
        &self,
        model: Option<&dyn SequenceModel>,
        recent: &[f64],
        window_size: usize,
        horizon: usize,
    ) -> Result<Option<Vec<f64>>, ServiceError>;
}

/// Stand-in used when forecasting is compiled out or switched off
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledBackend;

impl ForecastBackend for DisabledBackend {
    fn name(&self) -> &'static str {
        "disabled"
    }

    fn is_available(&self) -> bool {
        false
    }

    fn train(&self, _series: &[f64], _params: &TrainingParams) -> Result<TrainingOutcome, ServiceError> {
        Ok(TrainingOutcome::Unavailable)
    }

    fn forecast(
        &self,
        _model: Option<&dyn SequenceModel>,
        _recent: &[f64],
        _window_size: usize,
        _horizon: usize,
    ) -> Result<Option<Vec<f64>>, ServiceError> {
        Ok(None)
    }
}

/// LSTM backend
#[cfg(feature = "forecasting")]
#[derive(Debug, Clone, Copy, Default)]
pub struct RecurrentBackend;

#[cfg(feature = "forecasting")]
impl ForecastBackend for RecurrentBackend {
    fn name(&self) -> &'static str {
        "lstm"
    }

    fn is_available(&self) -> bool {
        true
    }

    #[instrument(skip(self, series, params), fields(len = series.len(), window = params.window_size, epochs = params.epochs))]
    fn train(&self, series: &[f64], params: &TrainingParams) -> Result<TrainingOutcome, ServiceError> {
        if params.window_size == 0 {
            return Err(ServiceError::InvalidInput(
                "window_size must be at least 1".to_string(),
            ));
        }
        if series.iter().any(|v| !v.is_finite()) {
            return Err(ServiceError::InvalidInput(
                "series contains non-finite values".to_string(),
            ));
        }

        let required = params.window_size + MIN_EXTRA_SAMPLES;
        if series.len() < required {
            warn!(
                required,
                available = series.len(),
                "Not enough data to train forecaster"
            );
            return Ok(TrainingOutcome::InsufficientData {
                required,
                available: series.len(),
            });
        }

        let model = super::recurrent::LstmForecaster::train(series, params)?;
        if let Some(last) = model.history().last() {
            info!(loss = last.loss, mae = last.mae, "Forecaster trained");
        }
        Ok(TrainingOutcome::Trained(Box::new(model)))
    }

    fn forecast(
        &self,
        model: Option<&dyn SequenceModel>,
        recent: &[f64],
        window_size: usize,
        horizon: usize,
    ) -> Result<Option<Vec<f64>>, ServiceError> {
        match model {
            Some(model) => rollout(model, recent, window_size, horizon).map(Some),
            None => Ok(None),
        }
    }
}

/// Picks the backend once, from build features and config.
pub fn select_backend(config: &ForecastingConfig) -> Box<dyn ForecastBackend> {
    #[cfg(feature = "forecasting")]
    {
        if config.enabled {
            return Box::new(RecurrentBackend);
        }
    }
    info!(
        enabled = config.enabled,
        "Forecasting backend unavailable; using disabled backend"
    );
    Box::new(DisabledBackend)
}

/// Trains with default hyper-parameters on the selected default backend.
pub fn train(series: &[f64], window_size: usize, epochs: usize) -> Result<TrainingOutcome, ServiceError> {
    let backend = select_backend(&ForecastingConfig::default());
    backend.train(series, &TrainingParams::new(window_size, epochs))
}

/// Autoregressive forecast on the selected default backend; `Ok(None)`
/// without a model or when forecasting is unavailable.
pub fn forecast(
    model: Option<&dyn SequenceModel>,
    recent: &[f64],
    window_size: usize,
    horizon: usize,
) -> Result<Option<Vec<f64>>, ServiceError> {
    let backend = select_backend(&ForecastingConfig::default());
    backend.forecast(model, recent, window_size, horizon)
}

/// Seeds a window with the last `window_size` observations and feeds each
/// prediction back in. Predictions are never corrected against data.
pub fn rollout(
    model: &dyn SequenceModel,
    recent: &[f64],
    window_size: usize,
    horizon: usize,
) -> Result<Vec<f64>, ServiceError> {
    if window_size != model.window_size() {
        return Err(ServiceError::InvalidInput(format!(
            "model was trained with window {}, got {}",
            model.window_size(),
            window_size
        )));
    }
    if recent.len() < window_size {
        return Err(ServiceError::InvalidInput(format!(
            "need at least {} recent values, got {}",
            window_size,
            recent.len()
        )));
    }
    if recent.iter().any(|v| !v.is_finite()) {
        return Err(ServiceError::InvalidInput(
            "recent series contains non-finite values".to_string(),
        ));
    }

    let mut window = recent[recent.len() - window_size..].to_vec();
    let mut out = Vec::with_capacity(horizon);
    for _ in 0..horizon {
        let next = model.predict_next(&window);
        out.push(next);
        window.remove(0);
        window.push(next);
    }
    Ok(out)
}
