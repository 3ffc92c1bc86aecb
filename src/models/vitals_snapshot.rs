use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::vital_record::{ActivityLevel, VitalRecord};

/// A loosely populated vital-sign reading, as handed over by storage or
/// manual entry. Any field may be missing; missing keys deserialize to
/// `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VitalsSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heart_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blood_oxygen: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub respiration_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_level: Option<ActivityLevel>,
}

impl VitalsSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_heart_rate(mut self, value: f64) -> Self {
        self.heart_rate = Some(value);
        self
    }

    pub fn with_blood_oxygen(mut self, value: f64) -> Self {
        self.blood_oxygen = Some(value);
        self
    }

    pub fn with_temperature(mut self, value: f64) -> Self {
        self.temperature = Some(value);
        self
    }

    pub fn with_respiration_rate(mut self, value: f64) -> Self {
        self.respiration_rate = Some(value);
        self
    }

    pub fn with_activity_level(mut self, level: ActivityLevel) -> Self {
        self.activity_level = Some(level);
        self
    }

    // Non-finite readings count as absent.

    pub fn heart_rate(&self) -> Option<f64> {
        self.heart_rate.filter(|v| v.is_finite())
    }

    pub fn blood_oxygen(&self) -> Option<f64> {
        self.blood_oxygen.filter(|v| v.is_finite())
    }

    pub fn temperature(&self) -> Option<f64> {
        self.temperature.filter(|v| v.is_finite())
    }

    pub fn respiration_rate(&self) -> Option<f64> {
        self.respiration_rate.filter(|v| v.is_finite())
    }

    /// True when none of the four numeric vitals is usable.
    pub fn has_no_vitals(&self) -> bool {
        self.heart_rate().is_none()
            && self.blood_oxygen().is_none()
            && self.temperature().is_none()
            && self.respiration_rate().is_none()
    }
}

impl From<&VitalRecord> for VitalsSnapshot {
    fn from(record: &VitalRecord) -> Self {
        Self {
            user_id: Some(record.user_id.clone()),
            timestamp: Some(record.timestamp),
            heart_rate: Some(f64::from(record.heart_rate)),
            blood_oxygen: Some(f64::from(record.blood_oxygen)),
            temperature: Some(record.temperature),
            respiration_rate: Some(f64::from(record.respiration_rate)),
            activity_level: Some(record.activity_level),
        }
    }
}
