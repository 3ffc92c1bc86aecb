use serde::{Deserialize, Serialize};

use crate::models::VitalsSnapshot;

/// Mean resting values for one user; a field is `None` when no history
/// row carried it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonalBaseline {
    pub heart_rate: Option<f64>,
    pub blood_oxygen: Option<f64>,
    pub temperature: Option<f64>,
}

fn mean_of(history: &[VitalsSnapshot], value: impl Fn(&VitalsSnapshot) -> Option<f64>) -> Option<f64> {
    let (sum, n) = history
        .iter()
        .filter_map(value)
        .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Returns `None` for an empty history.
pub fn calculate_baseline(history: &[VitalsSnapshot]) -> Option<PersonalBaseline> {
    if history.is_empty() {
        return None;
    }
    Some(PersonalBaseline {
        heart_rate: mean_of(history, VitalsSnapshot::heart_rate),
        blood_oxygen: mean_of(history, VitalsSnapshot::blood_oxygen),
        temperature: mean_of(history, VitalsSnapshot::temperature),
    })
}

/// Plain-language observations comparing a reading with the baseline.
pub fn generate_insights(current: &VitalsSnapshot, baseline: &PersonalBaseline) -> Vec<String> {
    let mut insights = Vec::new();

    if let (Some(hr), Some(base)) = (current.heart_rate(), baseline.heart_rate) {
        if hr > base * 1.2 {
            insights.push("Your heart rate is above your normal baseline.".to_string());
        }
    }
    if let (Some(o2), Some(base)) = (current.blood_oxygen(), baseline.blood_oxygen) {
        if o2 < base * 0.95 {
            insights.push("Your oxygen levels are trending down.".to_string());
        }
    }
    // Fever is judged on the absolute reading, not the baseline
    if current.temperature().map_or(false, |t| t > 37.5) {
        insights.push("You may have a fever.".to_string());
    }

    insights
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_averages_available_values() {
        let history = vec![
            VitalsSnapshot::new().with_heart_rate(60.0).with_temperature(36.4),
            VitalsSnapshot::new().with_heart_rate(80.0),
        ];
        let baseline = calculate_baseline(&history).unwrap();
        assert_eq!(baseline.heart_rate, Some(70.0));
        assert_eq!(baseline.blood_oxygen, None);
        assert_eq!(baseline.temperature, Some(36.4));
        assert!(calculate_baseline(&[]).is_none());
    }

    #[test]
    fn insights_fire_against_baseline() {
        let baseline = PersonalBaseline {
            heart_rate: Some(70.0),
            blood_oxygen: Some(98.0),
            temperature: Some(36.6),
        };
        let current = VitalsSnapshot::new()
            .with_heart_rate(90.0)
            .with_blood_oxygen(92.0)
            .with_temperature(38.0);
        assert_eq!(
            generate_insights(&current, &baseline),
            vec![
                "Your heart rate is above your normal baseline.",
                "Your oxygen levels are trending down.",
                "You may have a fever.",
            ]
        );

        let calm = VitalsSnapshot::new().with_heart_rate(72.0);
        assert!(generate_insights(&calm, &baseline).is_empty());
    }
}
