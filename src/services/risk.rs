//! Advisory risk estimate and the 0–100 health score.
//!
//! These rules use [`RiskThresholds`], a stricter set than the alert
//! engine. The two sets are configured independently.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::instrument;

use crate::config::RiskThresholds;
use crate::errors::ServiceError;
use crate::models::vital_record::round_to;
use crate::models::{AlertKind, AlertSeverity, VitalsSnapshot};

/// One advisory finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFinding {
    pub severity: AlertSeverity,
    pub condition: AlertKind,
    pub message: String,
}

impl fmt::Display for RiskFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} - {}", self.severity, self.condition, self.message)
    }
}

/// Evaluates the advisory rules. Heart rate, oxygen and respiration
/// readings at or below zero are treated as absent.
pub fn assess_risks(vitals: &VitalsSnapshot, thresholds: &RiskThresholds) -> Vec<RiskFinding> {
    let mut findings = Vec::new();
    let positive = |v: Option<f64>| v.filter(|x| *x > 0.0);

    if let Some(hr) = positive(vitals.heart_rate()) {
        if hr > thresholds.heart_rate_high {
            let severity = if hr > thresholds.heart_rate_severe {
                AlertSeverity::High
            } else {
                AlertSeverity::Medium
            };
            findings.push(RiskFinding {
                severity,
                condition: AlertKind::Tachycardia,
                message: format!("Heart rate {} BPM is elevated", hr),
            });
        } else if hr < thresholds.heart_rate_low {
            findings.push(RiskFinding {
                severity: AlertSeverity::Medium,
                condition: AlertKind::Bradycardia,
                message: format!("Heart rate {} BPM is low", hr),
            });
        }
    }

    if let Some(o2) = positive(vitals.blood_oxygen()) {
        if o2 < thresholds.blood_oxygen_low {
            let severity = if o2 < thresholds.blood_oxygen_critical {
                AlertSeverity::Critical
            } else {
                AlertSeverity::High
            };
            findings.push(RiskFinding {
                severity,
                condition: AlertKind::Hypoxia,
                message: format!("Blood oxygen {}% is low", o2),
            });
        }
    }

    if let Some(temp) = vitals.temperature() {
        if temp > thresholds.temperature_high {
            let severity = if temp > thresholds.temperature_severe {
                AlertSeverity::High
            } else {
                AlertSeverity::Medium
            };
            findings.push(RiskFinding {
                severity,
                condition: AlertKind::Fever,
                message: format!("Temperature {}°C is elevated", temp),
            });
        } else if temp < thresholds.temperature_low {
            findings.push(RiskFinding {
                severity: AlertSeverity::High,
                condition: AlertKind::Hypothermia,
                message: format!("Temperature {}°C is low", temp),
            });
        }
    }

    if let Some(resp) = positive(vitals.respiration_rate()) {
        if resp > thresholds.respiration_high {
            findings.push(RiskFinding {
                severity: AlertSeverity::Medium,
                condition: AlertKind::Tachypnea,
                message: format!("Respiration rate {} is elevated", resp),
            });
        } else if resp < thresholds.respiration_low {
            findings.push(RiskFinding {
                severity: AlertSeverity::Medium,
                condition: AlertKind::Bradypnea,
                message: format!("Respiration rate {} is low", resp),
            });
        }
    }

    findings
}

/// Display strings such as `[HIGH] Tachycardia - Heart rate 130 BPM is elevated`.
pub fn predict_risks(vitals: &VitalsSnapshot, thresholds: &RiskThresholds) -> Vec<String> {
    assess_risks(vitals, thresholds)
        .iter()
        .map(ToString::to_string)
        .collect()
}

// Health score bands
const HR_NORMAL: (f64, f64) = (60.0, 100.0);
const HR_CENTER: f64 = 80.0;
const HR_MAX_PENALTY: f64 = 20.0;
const O2_FLOOR: f64 = 95.0;
const O2_PENALTY_PER_POINT: f64 = 3.0;
const TEMP_NORMAL: (f64, f64) = (36.0, 37.5);
const TEMP_CENTER: f64 = 36.5;
const TEMP_PENALTY_PER_DEGREE: f64 = 10.0;
const RESP_NORMAL: (f64, f64) = (12.0, 20.0);
const RESP_CENTER: f64 = 16.0;
const RESP_MAX_PENALTY: f64 = 15.0;

/// Starts at 100 and subtracts a penalty per abnormal vital. Missing vitals
/// cost nothing; the result is clamped to [0, 100] and rounded to one
/// decimal.
#[instrument(skip(vitals))]
pub fn calculate_health_score(vitals: &VitalsSnapshot) -> Result<f64, ServiceError> {
    if vitals.has_no_vitals() {
        return Err(ServiceError::NoVitalSigns);
    }

    let outside = |v: f64, (lo, hi): (f64, f64)| v < lo || v > hi;
    let mut score = 100.0;

    if let Some(hr) = vitals.heart_rate() {
        if outside(hr, HR_NORMAL) {
            score -= ((hr - HR_CENTER).abs() / 2.0).min(HR_MAX_PENALTY);
        }
    }
    if let Some(o2) = vitals.blood_oxygen() {
        if o2 < O2_FLOOR {
            score -= (O2_FLOOR - o2) * O2_PENALTY_PER_POINT;
        }
    }
    if let Some(temp) = vitals.temperature() {
        if outside(temp, TEMP_NORMAL) {
            score -= (temp - TEMP_CENTER).abs() * TEMP_PENALTY_PER_DEGREE;
        }
    }
    if let Some(resp) = vitals.respiration_rate() {
        if outside(resp, RESP_NORMAL) {
            score -= ((resp - RESP_CENTER).abs() * 2.0).min(RESP_MAX_PENALTY);
        }
    }

    Ok(round_to(score, 1).clamp(0.0, 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;

    fn snapshot(hr: f64, o2: f64, temp: f64, resp: f64) -> VitalsSnapshot {
        VitalsSnapshot::new()
            .with_heart_rate(hr)
            .with_blood_oxygen(o2)
            .with_temperature(temp)
            .with_respiration_rate(resp)
    }

    #[rstest]
    #[case(snapshot(75.0, 98.0, 36.5, 16.0), 100.0)]
    #[case(snapshot(120.0, 98.0, 36.5, 16.0), 80.0)]
    #[case(snapshot(75.0, 90.0, 36.5, 16.0), 85.0)]
    #[case(snapshot(75.0, 98.0, 38.5, 16.0), 80.0)]
    #[case(snapshot(75.0, 98.0, 36.5, 30.0), 85.0)]
    #[case(snapshot(180.0, 80.0, 42.0, 40.0), 0.0)]
    fn health_score_cases(#[case] vitals: VitalsSnapshot, #[case] expected: f64) {
        assert_eq!(calculate_health_score(&vitals).unwrap(), expected);
    }

    #[test]
    fn health_score_needs_some_vital() {
        assert_matches!(
            calculate_health_score(&VitalsSnapshot::new()),
            Err(ServiceError::NoVitalSigns)
        );
        assert_eq!(
            calculate_health_score(&VitalsSnapshot::new().with_heart_rate(75.0)).unwrap(),
            100.0
        );
    }

    #[test]
    fn risk_strings_carry_severity_bands() {
        let t = RiskThresholds::default();
        assert_eq!(
            predict_risks(&VitalsSnapshot::new().with_heart_rate(130.0), &t),
            vec!["[HIGH] Tachycardia - Heart rate 130 BPM is elevated"]
        );
        assert_eq!(
            predict_risks(&VitalsSnapshot::new().with_heart_rate(110.0), &t),
            vec!["[MEDIUM] Tachycardia - Heart rate 110 BPM is elevated"]
        );
        assert_eq!(
            predict_risks(&VitalsSnapshot::new().with_blood_oxygen(88.0), &t),
            vec!["[CRITICAL] Hypoxia - Blood oxygen 88% is low"]
        );
        assert_eq!(
            predict_risks(&VitalsSnapshot::new().with_temperature(35.5), &t),
            vec!["[HIGH] Hypothermia - Temperature 35.5°C is low"]
        );
    }

    #[test]
    fn zero_readings_are_ignored_by_risks() {
        let t = RiskThresholds::default();
        let vitals = VitalsSnapshot::new()
            .with_heart_rate(0.0)
            .with_blood_oxygen(0.0)
            .with_respiration_rate(0.0);
        assert!(assess_risks(&vitals, &t).is_empty());
    }

    #[test]
    fn risk_rules_are_stricter_than_alerts() {
        // Neither reading would raise an alert with default thresholds
        let t = RiskThresholds::default();
        let vitals = VitalsSnapshot::new()
            .with_blood_oxygen(94.0)
            .with_respiration_rate(21.0);
        let findings = assess_risks(&vitals, &t);
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].condition, AlertKind::Hypoxia);
        assert_eq!(findings[1].condition, AlertKind::Tachypnea);
    }
}
