use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use crate::config::AlertThresholds;
use crate::errors::ServiceError;
use crate::models::{Alert, AlertKind, AlertSeverity, VitalsSnapshot};

/// Default number of entries returned by history queries.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Applies the alert rules to one snapshot. Absent vitals are skipped.
pub fn evaluate_vitals(
    vitals: &VitalsSnapshot,
    user_id: &str,
    thresholds: &AlertThresholds,
    timestamp: DateTime<Utc>,
) -> Vec<Alert> {
    let mut alerts = Vec::new();
    let mut raise = |severity, kind, message: String| {
        alerts.push(Alert::new(severity, kind, message, user_id, timestamp));
    };

    if let Some(hr) = vitals.heart_rate() {
        if hr > thresholds.heart_rate_high {
            raise(
                AlertSeverity::High,
                AlertKind::Tachycardia,
                format!(
                    "Heart rate {} BPM exceeds safe threshold ({} BPM)",
                    hr, thresholds.heart_rate_high
                ),
            );
        } else if hr < thresholds.heart_rate_low {
            raise(
                AlertSeverity::High,
                AlertKind::Bradycardia,
                format!(
                    "Heart rate {} BPM below safe threshold ({} BPM)",
                    hr, thresholds.heart_rate_low
                ),
            );
        }
    }

    if let Some(o2) = vitals.blood_oxygen() {
        if o2 < thresholds.blood_oxygen_low {
            raise(
                AlertSeverity::Critical,
                AlertKind::Hypoxia,
                format!(
                    "Blood oxygen {}% is critically low (threshold: {}%)",
                    o2, thresholds.blood_oxygen_low
                ),
            );
        }
    }

    if let Some(temp) = vitals.temperature() {
        if temp > thresholds.temperature_high {
            raise(
                AlertSeverity::Medium,
                AlertKind::Fever,
                format!(
                    "Temperature {}°C indicates potential fever (threshold: {}°C)",
                    temp, thresholds.temperature_high
                ),
            );
        } else if temp < thresholds.temperature_low {
            raise(
                AlertSeverity::High,
                AlertKind::Hypothermia,
                format!(
                    "Temperature {}°C is dangerously low (threshold: {}°C)",
                    temp, thresholds.temperature_low
                ),
            );
        }
    }

    if let Some(resp) = vitals.respiration_rate() {
        if resp > thresholds.respiration_high {
            raise(
                AlertSeverity::Medium,
                AlertKind::Tachypnea,
                format!(
                    "Respiration rate {} breaths/min is elevated (threshold: {})",
                    resp, thresholds.respiration_high
                ),
            );
        } else if resp < thresholds.respiration_low {
            raise(
                AlertSeverity::High,
                AlertKind::Bradypnea,
                format!(
                    "Respiration rate {} breaths/min is too low (threshold: {})",
                    resp, thresholds.respiration_low
                ),
            );
        }
    }

    alerts
}

/// Like [`evaluate_vitals`] stamped with the current time, but a snapshot
/// without any usable vital is an error.
pub fn check_vitals(
    vitals: &VitalsSnapshot,
    user_id: &str,
    thresholds: &AlertThresholds,
) -> Result<Vec<Alert>, ServiceError> {
    if vitals.has_no_vitals() {
        return Err(ServiceError::NoVitalSigns);
    }
    Ok(evaluate_vitals(vitals, user_id, thresholds, Utc::now()))
}

/// Append-only alert history
pub trait AlertLog: Send + Sync {
    fn append(&mut self, alerts: &[Alert]);

    /// Most recent `limit` alerts in insertion order, optionally for one user.
    fn recent(&self, user_id: Option<&str>, limit: usize) -> Vec<Alert>;

    fn clear(&mut self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryAlertLog {
    entries: Vec<Alert>,
}

impl InMemoryAlertLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AlertLog for InMemoryAlertLog {
    fn append(&mut self, alerts: &[Alert]) {
        self.entries.extend_from_slice(alerts);
    }

    fn recent(&self, user_id: Option<&str>, limit: usize) -> Vec<Alert> {
        let matching: Vec<&Alert> = self
            .entries
            .iter()
            .filter(|a| user_id.map_or(true, |u| a.user_id == u))
            .collect();
        let start = matching.len().saturating_sub(limit);
        matching[start..].iter().map(|a| (*a).clone()).collect()
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Threshold checks with an owned history
#[derive(Debug, Clone)]
pub struct AlertEngine<L: AlertLog = InMemoryAlertLog> {
    thresholds: AlertThresholds,
    log: L,
}

impl AlertEngine<InMemoryAlertLog> {
    pub fn in_memory(thresholds: AlertThresholds) -> Self {
        Self::new(thresholds, InMemoryAlertLog::new())
    }
}

impl<L: AlertLog> AlertEngine<L> {
    pub fn new(thresholds: AlertThresholds, log: L) -> Self {
        Self { thresholds, log }
    }

    pub fn thresholds(&self) -> &AlertThresholds {
        &self.thresholds
    }

    /// Checks a snapshot and records whatever fired.
    #[instrument(skip(self, vitals))]
    pub fn check(&mut self, vitals: &VitalsSnapshot, user_id: &str) -> Result<Vec<Alert>, ServiceError> {
        let alerts = check_vitals(vitals, user_id, &self.thresholds)?;
        if !alerts.is_empty() {
            let urgent = alerts.iter().filter(|a| a.severity.is_urgent()).count();
            if urgent > 0 {
                warn!(user_id, count = alerts.len(), urgent, "Vital-sign alerts raised");
            } else {
                info!(user_id, count = alerts.len(), "Vital-sign alerts raised");
            }
            self.log.append(&alerts);
        }
        Ok(alerts)
    }

    pub fn history(&self, user_id: Option<&str>, limit: usize) -> Vec<Alert> {
        self.log.recent(user_id, limit)
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    pub fn log_mut(&mut self) -> &mut L {
        &mut self.log
    }
}
