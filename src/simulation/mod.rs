/*!
 * # Synthetic vital-sign generation
 *
 * Produces per-minute [`VitalRecord`] series for simulated users, with an
 * optional fraction of minutes replaced by one of four anomaly archetypes.
 *
 * Each user's baseline is derived from a SHA-256 digest of the user id, so
 * it is stable across calls and processes. The per-minute draws come from
 * a separate generator that is seeded only when the caller asks for it.
 */

use chrono::{DateTime, Duration, Utc};
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};
use tracing::{debug, info, instrument};

use crate::config::SimulationConfig;
use crate::errors::ServiceError;
use crate::models::{ActivityLevel, VitalRecord};

/// Pattern an injected anomaly follows
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Archetype {
    /// Heart rate 110–139 bpm
    HighHr,
    /// SpO2 85–91 % with respiration 20–27
    LowO2,
    /// Temperature 38.0–39.5 °C with a raised heart rate
    HighTemp,
    /// Respiration 25–34 breaths/min
    HighResp,
}

/// Per-user resting values every minute is drawn around
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub heart_rate: i32,
    pub blood_oxygen: i32,
    pub temperature: f64,
    pub respiration_rate: i32,
}

impl Baseline {
    /// Deterministic baseline for `user_id`.
    pub fn for_user(user_id: &str) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(user_seed(user_id));
        Self {
            heart_rate: rng.gen_range(65..80),
            blood_oxygen: rng.gen_range(95..99),
            temperature: round1(rng.gen_range(36.2..36.8)),
            respiration_rate: rng.gen_range(14..18),
        }
    }
}

/// Marks one row of a generated series as injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectedAnomaly {
    pub index: usize,
    pub archetype: Archetype,
}

/// Generated records plus the positions that were deliberately made abnormal
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulatedSeries {
    pub records: Vec<VitalRecord>,
    /// Sorted by index
    pub injected: Vec<InjectedAnomaly>,
}

impl SimulatedSeries {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// One flag per record, true where an anomaly was injected.
    pub fn ground_truth(&self) -> Vec<bool> {
        let mut mask = vec![false; self.records.len()];
        for anomaly in &self.injected {
            if let Some(slot) = mask.get_mut(anomaly.index) {
                *slot = true;
            }
        }
        mask
    }

    fn extend(&mut self, other: SimulatedSeries) {
        let offset = self.records.len();
        self.injected
            .extend(other.injected.into_iter().map(|a| InjectedAnomaly {
                index: a.index + offset,
                archetype: a.archetype,
            }));
        self.records.extend(other.records);
    }
}

/// Synthetic vital-sign generator
#[derive(Debug, Clone, Default)]
pub struct VitalGenerator {
    seed: Option<u64>,
    anchor: Option<DateTime<Utc>>,
}

impl VitalGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &SimulationConfig) -> Self {
        Self {
            seed: config.seed,
            anchor: None,
        }
    }

    /// Makes every draw reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Fixes "now"; series end one minute before this instant.
    pub fn with_anchor(mut self, anchor: DateTime<Utc>) -> Self {
        self.anchor = Some(anchor);
        self
    }

    /// Generates `count` per-minute records for one user, starting
    /// `count` minutes before the anchor.
    #[instrument(skip(self), fields(seeded = self.seed.is_some()))]
    pub fn generate_series(
        &self,
        user_id: &str,
        count: usize,
        inject_anomalies: bool,
        anomaly_rate: f64,
    ) -> Result<SimulatedSeries, ServiceError> {
        validate_rate(anomaly_rate)?;

        let baseline = Baseline::for_user(user_id);
        let mut rng = self.sample_rng(user_id);
        let start = self.anchor.unwrap_or_else(Utc::now) - minutes(count);

        let mut archetypes: Vec<Option<Archetype>> = vec![None; count];
        if inject_anomalies && count > 0 {
            let wanted = ((count as f64) * anomaly_rate).round() as usize;
            let wanted = wanted.min(count);
            let all: Vec<Archetype> = Archetype::iter().collect();
            for idx in index::sample(&mut rng, count, wanted).into_iter() {
                archetypes[idx] = Some(all[rng.gen_range(0..all.len())]);
            }
        }

        let mut series = SimulatedSeries {
            records: Vec::with_capacity(count),
            injected: Vec::new(),
        };

        for (i, archetype) in archetypes.into_iter().enumerate() {
            let (hr, o2, temp, resp) = match archetype {
                Some(kind) => {
                    series.injected.push(InjectedAnomaly {
                        index: i,
                        archetype: kind,
                    });
                    anomalous_vitals(&mut rng, &baseline, kind)
                }
                None => normal_vitals(&mut rng, &baseline),
            };
            let activity = draw_activity(&mut rng);
            series.records.push(VitalRecord::new(
                user_id,
                start + minutes(i),
                hr,
                o2,
                temp,
                resp,
                activity,
            ));
        }

        debug!(
            user_id,
            records = series.records.len(),
            injected = series.injected.len(),
            "Generated vital series"
        );
        Ok(series)
    }

    /// Concatenates independent series for `User_1..User_N`, always
    /// injecting anomalies at `anomaly_rate`.
    #[instrument(skip(self))]
    pub fn generate_multi_user_series(
        &self,
        num_users: usize,
        count_per_user: usize,
        anomaly_rate: f64,
    ) -> Result<SimulatedSeries, ServiceError> {
        validate_rate(anomaly_rate)?;

        let mut combined = SimulatedSeries::default();
        for n in 1..=num_users {
            let user_id = format!("User_{}", n);
            combined.extend(self.generate_series(&user_id, count_per_user, true, anomaly_rate)?);
        }

        info!(
            users = num_users,
            records = combined.len(),
            injected = combined.injected.len(),
            "Generated multi-user dataset"
        );
        Ok(combined)
    }

    fn sample_rng(&self, user_id: &str) -> ChaCha8Rng {
        match self.seed {
            // Mix in the user so users sharing a seed still differ
            Some(seed) => ChaCha8Rng::seed_from_u64(seed ^ user_seed(user_id)),
            None => ChaCha8Rng::from_entropy(),
        }
    }
}

/// First eight bytes of SHA-256(user_id), big-endian.
pub fn user_seed(user_id: &str) -> u64 {
    let digest = Sha256::digest(user_id.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

fn normal_vitals(rng: &mut ChaCha8Rng, b: &Baseline) -> (i32, i32, f64, i32) {
    (
        b.heart_rate + rng.gen_range(-5..10),
        b.blood_oxygen + rng.gen_range(-2..3),
        b.temperature + round2(rng.gen_range(-0.4..0.4)),
        b.respiration_rate + rng.gen_range(-3..4),
    )
}

fn anomalous_vitals(rng: &mut ChaCha8Rng, b: &Baseline, kind: Archetype) -> (i32, i32, f64, i32) {
    match kind {
        Archetype::HighHr => (
            rng.gen_range(110..140),
            b.blood_oxygen + rng.gen_range(-2..3),
            b.temperature + round2(rng.gen_range(-0.3..0.3)),
            b.respiration_rate + rng.gen_range(-2..3),
        ),
        Archetype::LowO2 => (
            b.heart_rate + rng.gen_range(-3..8),
            rng.gen_range(85..92),
            b.temperature + round2(rng.gen_range(-0.2..0.4)),
            rng.gen_range(20..28),
        ),
        Archetype::HighTemp => (
            b.heart_rate + rng.gen_range(5..20),
            b.blood_oxygen + rng.gen_range(-3..1),
            round2(rng.gen_range(38.0..39.5)),
            b.respiration_rate + rng.gen_range(2..6),
        ),
        Archetype::HighResp => (
            b.heart_rate + rng.gen_range(5..15),
            b.blood_oxygen + rng.gen_range(-2..2),
            b.temperature + round2(rng.gen_range(-0.2..0.5)),
            rng.gen_range(25..35),
        ),
    }
}

fn draw_activity(rng: &mut ChaCha8Rng) -> ActivityLevel {
    let roll: f64 = rng.gen();
    if roll < 0.5 {
        ActivityLevel::Low
    } else if roll < 0.85 {
        ActivityLevel::Moderate
    } else {
        ActivityLevel::High
    }
}

fn validate_rate(rate: f64) -> Result<(), ServiceError> {
    if !rate.is_finite() || !(0.0..=1.0).contains(&rate) {
        return Err(ServiceError::InvalidInput(format!(
            "anomaly_rate must be within [0, 1], got {}",
            rate
        )));
    }
    Ok(())
}

fn minutes(n: usize) -> Duration {
    Duration::minutes(i64::try_from(n).unwrap_or(i64::MAX / 60_000))
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn anchor() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn baseline_is_stable_per_user() {
        assert_eq!(Baseline::for_user("alice"), Baseline::for_user("alice"));
        let b = Baseline::for_user("bob");
        assert!((65..80).contains(&b.heart_rate));
        assert!((95..99).contains(&b.blood_oxygen));
        assert!((36.2..=36.8).contains(&b.temperature));
        assert!((14..18).contains(&b.respiration_rate));
    }

    #[test]
    fn user_seed_differs_between_users() {
        assert_ne!(user_seed("User_1"), user_seed("User_2"));
        assert_eq!(user_seed("User_1"), user_seed("User_1"));
    }

    #[test]
    fn timestamps_are_one_minute_apart_ending_before_anchor() {
        let series = VitalGenerator::new()
            .with_seed(1)
            .with_anchor(anchor())
            .generate_series("u1", 5, false, 0.0)
            .unwrap();
        assert_eq!(series.records[0].timestamp, anchor() - Duration::minutes(5));
        for pair in series.records.windows(2) {
            assert_eq!(pair[1].timestamp - pair[0].timestamp, Duration::minutes(1));
        }
        assert!(series.injected.is_empty());
    }

    #[test]
    fn seeded_generation_is_reproducible() {
        let generator = VitalGenerator::new().with_seed(7).with_anchor(anchor());
        let a = generator.generate_series("u1", 200, true, 0.1).unwrap();
        let b = generator.generate_series("u1", 200, true, 0.1).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_rate_outside_unit_interval() {
        let err = VitalGenerator::new()
            .generate_series("u1", 10, true, 1.5)
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[test]
    fn multi_user_offsets_injected_indices() {
        let series = VitalGenerator::new()
            .with_seed(3)
            .generate_multi_user_series(3, 100, 0.05)
            .unwrap();
        assert_eq!(series.len(), 300);
        assert_eq!(series.injected.len(), 15);
        assert_eq!(series.records[0].user_id, "User_1");
        assert_eq!(series.records[299].user_id, "User_3");
        let truth = series.ground_truth();
        for anomaly in &series.injected {
            assert!(truth[anomaly.index]);
        }
        assert!(series.injected.iter().any(|a| a.index >= 200));
    }

    #[test]
    fn archetype_names_are_snake_case() {
        assert_eq!(Archetype::HighHr.to_string(), "high_hr");
        assert_eq!("low_o2".parse::<Archetype>().unwrap(), Archetype::LowO2);
    }
}
