use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, IntoEnumIterator};
use tracing::{debug, instrument};

use crate::errors::ServiceError;
use crate::models::{VitalRecord, VitalsSnapshot};

/// Candidate model input, in matrix column order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FeatureColumn {
    HeartRate,
    BloodOxygen,
    Temperature,
    RespirationRate,
    #[strum(serialize = "activity_encoded")]
    #[serde(rename = "activity_encoded")]
    ActivityLevel,
}

impl FeatureColumn {
    pub fn value(self, row: &VitalsSnapshot) -> Option<f64> {
        match self {
            FeatureColumn::HeartRate => row.heart_rate(),
            FeatureColumn::BloodOxygen => row.blood_oxygen(),
            FeatureColumn::Temperature => row.temperature(),
            FeatureColumn::RespirationRate => row.respiration_rate(),
            FeatureColumn::ActivityLevel => row.activity_level.map(|a| f64::from(a.encoded())),
        }
    }

    fn is_vital(self) -> bool {
        !matches!(self, FeatureColumn::ActivityLevel)
    }
}

/// Input row with its encoded activity level attached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedRow {
    #[serde(flatten)]
    pub snapshot: VitalsSnapshot,
    pub activity_encoded: Option<u8>,
}

/// Zero-mean, unit-variance scaling fitted per column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl StandardScaler {
    /// Fits per-column mean and population standard deviation. A column
    /// with no spread gets a scale of 1.
    pub fn fit(matrix: &Array2<f64>) -> Result<Self, ServiceError> {
        if matrix.nrows() == 0 || matrix.ncols() == 0 {
            return Err(ServiceError::InvalidInput(
                "cannot fit a scaler on an empty matrix".to_string(),
            ));
        }
        let mean = matrix
            .mean_axis(Axis(0))
            .ok_or_else(|| ServiceError::InternalError("mean of empty axis".to_string()))?;
        let scale = matrix
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > f64::EPSILON { s } else { 1.0 });
        Ok(Self { mean, scale })
    }

    pub fn transform(&self, matrix: &Array2<f64>) -> Result<Array2<f64>, ServiceError> {
        if matrix.ncols() != self.mean.len() {
            return Err(ServiceError::InvalidInput(format!(
                "scaler fitted on {} columns, got {}",
                self.mean.len(),
                matrix.ncols()
            )));
        }
        Ok((matrix - &self.mean) / &self.scale)
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    pub fn scale(&self) -> &Array1<f64> {
        &self.scale
    }
}

/// Maps a single series onto [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    min: f64,
    max: f64,
}

impl MinMaxScaler {
    pub fn fit(series: &[f64]) -> Result<Self, ServiceError> {
        if series.is_empty() || series.iter().any(|v| !v.is_finite()) {
            return Err(ServiceError::InvalidInput(
                "min-max scaling needs a non-empty, finite series".to_string(),
            ));
        }
        let min = series.iter().copied().fold(f64::INFINITY, f64::min);
        let max = series.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Ok(Self { min, max })
    }

    fn range(&self) -> f64 {
        let range = self.max - self.min;
        if range > f64::EPSILON {
            range
        } else {
            1.0
        }
    }

    pub fn transform(&self, value: f64) -> f64 {
        (value - self.min) / self.range()
    }

    pub fn inverse(&self, value: f64) -> f64 {
        value * self.range() + self.min
    }

    pub fn transform_all(&self, series: &[f64]) -> Vec<f64> {
        series.iter().map(|v| self.transform(*v)).collect()
    }
}

/// Output of [`preprocess`]
#[derive(Debug, Clone)]
pub struct Preprocessed {
    pub rows: Vec<AnnotatedRow>,
    /// Scaled, one row per input row
    pub matrix: Array2<f64>,
    pub columns: Vec<FeatureColumn>,
    pub scaler: StandardScaler,
}

impl Preprocessed {
    pub fn feature_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.to_string()).collect()
    }
}

/// Builds the scaled feature matrix.
///
/// A column is kept only when every row carries a usable value for it.
/// Fails with [`ServiceError::NoFeatures`] when none of the four vitals
/// survives.
#[instrument(skip(rows), fields(rows = rows.len()))]
pub fn preprocess(rows: &[VitalsSnapshot]) -> Result<Preprocessed, ServiceError> {
    if rows.is_empty() {
        return Err(ServiceError::InvalidInput(
            "no rows to preprocess".to_string(),
        ));
    }

    let columns: Vec<FeatureColumn> = FeatureColumn::iter()
        .filter(|col| rows.iter().all(|row| col.value(row).is_some()))
        .collect();

    if !columns.iter().any(|c| c.is_vital()) {
        return Err(ServiceError::NoFeatures);
    }

    let mut raw = Array2::<f64>::zeros((rows.len(), columns.len()));
    for (i, row) in rows.iter().enumerate() {
        for (j, col) in columns.iter().enumerate() {
            raw[[i, j]] = col.value(row).unwrap_or_default();
        }
    }

    let scaler = StandardScaler::fit(&raw)?;
    let matrix = scaler.transform(&raw)?;

    let annotated = rows
        .iter()
        .map(|row| AnnotatedRow {
            snapshot: row.clone(),
            activity_encoded: row.activity_level.map(|a| a.encoded()),
        })
        .collect();

    debug!(columns = ?columns, "Preprocessed feature matrix");
    Ok(Preprocessed {
        rows: annotated,
        matrix,
        columns,
        scaler,
    })
}

/// [`preprocess`] over fully populated records.
pub fn preprocess_records(records: &[VitalRecord]) -> Result<Preprocessed, ServiceError> {
    let rows: Vec<VitalsSnapshot> = records.iter().map(VitalsSnapshot::from).collect();
    preprocess(&rows)
}
