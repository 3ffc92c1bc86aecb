use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, IntoEnumIterator};

use crate::errors::ServiceError;
use crate::ml::anomaly_detection::AnomalyLabel;
use crate::models::VitalRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VitalMetric {
    HeartRate,
    BloodOxygen,
    Temperature,
    RespirationRate,
}

impl VitalMetric {
    pub fn value(self, record: &VitalRecord) -> f64 {
        match self {
            VitalMetric::HeartRate => f64::from(record.heart_rate),
            VitalMetric::BloodOxygen => f64::from(record.blood_oxygen),
            VitalMetric::Temperature => record.temperature,
            VitalMetric::RespirationRate => f64::from(record.respiration_rate),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
}

/// Card figures for one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub metric: VitalMetric,
    /// Latest reading
    pub current: f64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// `Up` when the latest reading is above the mean
    pub trend: Trend,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalySummary {
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsOverview {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub total_records: usize,
    pub metrics: Vec<MetricSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anomalies: Option<AnomalySummary>,
}

/// Summarises records, optionally restricted to one user. `labels`, when
/// given, must line up with `records` by position. Returns `None` when no
/// record is left after filtering.
pub fn summarize_metrics(
    records: &[VitalRecord],
    labels: Option<&[AnomalyLabel]>,
    user_id: Option<&str>,
) -> Result<Option<MetricsOverview>, ServiceError> {
    if let Some(labels) = labels {
        if labels.len() != records.len() {
            return Err(ServiceError::InvalidInput(format!(
                "{} records but {} labels",
                records.len(),
                labels.len()
            )));
        }
    }

    let selected: Vec<usize> = records
        .iter()
        .enumerate()
        .filter(|(_, r)| user_id.map_or(true, |u| r.user_id == u))
        .map(|(i, _)| i)
        .collect();

    let Some(&latest) = selected.last() else {
        return Ok(None);
    };

    let metrics = VitalMetric::iter()
        .map(|metric| {
            let values: Vec<f64> = selected.iter().map(|&i| metric.value(&records[i])).collect();
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            let current = metric.value(&records[latest]);
            MetricSummary {
                metric,
                current,
                mean,
                min: values.iter().copied().fold(f64::INFINITY, f64::min),
                max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                trend: if current > mean { Trend::Up } else { Trend::Down },
            }
        })
        .collect();

    let anomalies = labels.map(|labels| {
        let count = selected.iter().filter(|&&i| labels[i].is_anomaly()).count();
        AnomalySummary {
            count,
            percentage: count as f64 / selected.len() as f64 * 100.0,
        }
    });

    Ok(Some(MetricsOverview {
        user_id: user_id.map(str::to_string),
        total_records: selected.len(),
        metrics,
        anomalies,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActivityLevel;
    use chrono::Utc;

    fn record(user: &str, hr: i32) -> VitalRecord {
        VitalRecord::new(user, Utc::now(), hr, 97, 36.6, 16, ActivityLevel::Low)
    }

    #[test]
    fn summarizes_one_user() {
        let records = vec![record("a", 60), record("b", 150), record("a", 90)];
        let labels = [AnomalyLabel::Normal, AnomalyLabel::Anomaly, AnomalyLabel::Anomaly];
        let overview = summarize_metrics(&records, Some(&labels), Some("a"))
            .unwrap()
            .unwrap();

        assert_eq!(overview.total_records, 2);
        let hr = &overview.metrics[0];
        assert_eq!(hr.metric, VitalMetric::HeartRate);
        assert_eq!(hr.current, 90.0);
        assert_eq!(hr.mean, 75.0);
        assert_eq!(hr.min, 60.0);
        assert_eq!(hr.max, 90.0);
        assert_eq!(hr.trend, Trend::Up);

        let anomalies = overview.anomalies.unwrap();
        assert_eq!(anomalies.count, 1);
        assert_eq!(anomalies.percentage, 50.0);
    }

    #[test]
    fn unknown_user_yields_nothing() {
        let records = vec![record("a", 60)];
        assert!(summarize_metrics(&records, None, Some("zz")).unwrap().is_none());
    }

    #[test]
    fn mismatched_labels_are_rejected() {
        let records = vec![record("a", 60)];
        assert!(summarize_metrics(&records, Some(&[]), None).is_err());
    }
}
