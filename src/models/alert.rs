use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Alert and risk severity, ordered from least to most urgent
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
    EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum AlertSeverity {
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    /// Severities that warrant an out-of-band (SMS) page.
    pub fn is_urgent(self) -> bool {
        matches!(self, AlertSeverity::High | AlertSeverity::Critical)
    }
}

/// Named physiological condition an alert or risk refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum AlertKind {
    Tachycardia,
    Bradycardia,
    Hypoxia,
    Fever,
    Hypothermia,
    Tachypnea,
    Bradypnea,
}

/// A triggered threshold rule. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub severity: AlertSeverity,
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub message: String,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn new(
        severity: AlertSeverity,
        kind: AlertKind,
        message: impl Into<String>,
        user_id: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            severity,
            kind,
            message: message.into(),
            user_id: user_id.into(),
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_orders_by_urgency() {
        assert!(AlertSeverity::Critical > AlertSeverity::High);
        assert!(AlertSeverity::High > AlertSeverity::Medium);
        assert!(!AlertSeverity::Medium.is_urgent());
        assert!(AlertSeverity::Critical.is_urgent());
    }

    #[test]
    fn alert_serializes_with_type_field() {
        let alert = Alert::new(
            AlertSeverity::Critical,
            AlertKind::Hypoxia,
            "low",
            "u1",
            Utc::now(),
        );
        let value = serde_json::to_value(&alert).unwrap();
        assert_eq!(value["severity"], "CRITICAL");
        assert_eq!(value["type"], "Hypoxia");
        assert_eq!(value["user_id"], "u1");
    }
}
