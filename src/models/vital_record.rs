use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Physiologically plausible bounds applied when a record is created.
pub const HEART_RATE_BOUNDS: (u16, u16) = (40, 180);
pub const BLOOD_OXYGEN_BOUNDS: (u8, u8) = (80, 100);
pub const TEMPERATURE_BOUNDS: (f64, f64) = (34.0, 42.0);
pub const RESPIRATION_RATE_BOUNDS: (u16, u16) = (8, 40);

/// Self-reported or sensed activity intensity
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ActivityLevel {
    Low,
    Moderate,
    High,
}

impl ActivityLevel {
    /// Ordinal encoding used as a model feature (low→0, moderate→1, high→2).
    pub fn encoded(self) -> u8 {
        match self {
            ActivityLevel::Low => 0,
            ActivityLevel::Moderate => 1,
            ActivityLevel::High => 2,
        }
    }
}

/// One timestamped observation of a user's vital signs.
///
/// Fields are clamped into the physiological bounds by [`VitalRecord::new`],
/// deserialization included; a record is never mutated after it is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawVitalRecord")]
pub struct VitalRecord {
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    /// Beats per minute
    pub heart_rate: u16,
    /// SpO2 percentage
    pub blood_oxygen: u8,
    /// Degrees Celsius, two decimals
    pub temperature: f64,
    /// Breaths per minute
    pub respiration_rate: u16,
    pub activity_level: ActivityLevel,
}

/// Wire form of a record before clamping
#[derive(Deserialize)]
struct RawVitalRecord {
    user_id: String,
    timestamp: DateTime<Utc>,
    heart_rate: i32,
    blood_oxygen: i32,
    temperature: f64,
    respiration_rate: i32,
    activity_level: ActivityLevel,
}

impl From<RawVitalRecord> for VitalRecord {
    fn from(raw: RawVitalRecord) -> Self {
        VitalRecord::new(
            raw.user_id,
            raw.timestamp,
            raw.heart_rate,
            raw.blood_oxygen,
            raw.temperature,
            raw.respiration_rate,
            raw.activity_level,
        )
    }
}

impl VitalRecord {
    /// Builds a record from raw (possibly out-of-range) readings.
    pub fn new(
        user_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        heart_rate: i32,
        blood_oxygen: i32,
        temperature: f64,
        respiration_rate: i32,
        activity_level: ActivityLevel,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            timestamp,
            heart_rate: clamp_heart_rate(heart_rate),
            blood_oxygen: clamp_blood_oxygen(blood_oxygen),
            temperature: round_to(clamp_temperature(temperature), 2),
            respiration_rate: clamp_respiration_rate(respiration_rate),
            activity_level,
        }
    }

    /// True when every numeric field lies inside its physiological bound.
    pub fn within_bounds(&self) -> bool {
        (HEART_RATE_BOUNDS.0..=HEART_RATE_BOUNDS.1).contains(&self.heart_rate)
            && (BLOOD_OXYGEN_BOUNDS.0..=BLOOD_OXYGEN_BOUNDS.1).contains(&self.blood_oxygen)
            && (TEMPERATURE_BOUNDS.0..=TEMPERATURE_BOUNDS.1).contains(&self.temperature)
            && (RESPIRATION_RATE_BOUNDS.0..=RESPIRATION_RATE_BOUNDS.1)
                .contains(&self.respiration_rate)
    }
}

pub fn clamp_heart_rate(value: i32) -> u16 {
    value.clamp(HEART_RATE_BOUNDS.0 as i32, HEART_RATE_BOUNDS.1 as i32) as u16
}

pub fn clamp_blood_oxygen(value: i32) -> u8 {
    value.clamp(BLOOD_OXYGEN_BOUNDS.0 as i32, BLOOD_OXYGEN_BOUNDS.1 as i32) as u8
}

pub fn clamp_temperature(value: f64) -> f64 {
    value.clamp(TEMPERATURE_BOUNDS.0, TEMPERATURE_BOUNDS.1)
}

pub fn clamp_respiration_rate(value: i32) -> u16 {
    value.clamp(
        RESPIRATION_RATE_BOUNDS.0 as i32,
        RESPIRATION_RATE_BOUNDS.1 as i32,
    ) as u16
}

/// Rounds half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
