use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::models::Alert;

/// Represents an outgoing notification
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: String,
    pub channel: NotificationChannel,
    pub recipient: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Delivery channels
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NotificationChannel {
    Email,
    Sms,
}

/// Notification delivery errors
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Where a user wants to be told about alerts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactDetails {
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Trait for notification delivery
pub trait Notifier: Send + Sync {
    fn send(&mut self, notification: Notification) -> Result<(), NotificationError>;
}

/// Logs notifications instead of delivering them and keeps an outbox.
#[derive(Debug, Clone, Default)]
pub struct SimulatedNotifier {
    outbox: Vec<Notification>,
}

impl SimulatedNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outbox(&self) -> &[Notification] {
        &self.outbox
    }

    pub fn sent_on(&self, channel: NotificationChannel) -> impl Iterator<Item = &Notification> {
        self.outbox.iter().filter(move |n| n.channel == channel)
    }
}

impl Notifier for SimulatedNotifier {
    fn send(&mut self, notification: Notification) -> Result<(), NotificationError> {
        if notification.recipient.trim().is_empty() {
            return Err(NotificationError::InvalidRecipient(
                "recipient is empty".to_string(),
            ));
        }
        info!(
            id = %notification.id,
            channel = %notification.channel,
            recipient = %notification.recipient,
            subject = notification.subject.as_deref().unwrap_or(""),
            "Simulated notification: {}",
            notification.message
        );
        self.outbox.push(notification);
        Ok(())
    }
}

/// Counts of notifications handed to the notifier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub emails: usize,
    pub sms: usize,
}

/// Emails every alert and texts the urgent (HIGH/CRITICAL) ones.
#[instrument(skip(alerts, contact, notifier), fields(alerts = alerts.len()))]
pub fn dispatch_alerts<N: Notifier + ?Sized>(
    alerts: &[Alert],
    contact: &ContactDetails,
    notifier: &mut N,
) -> Result<DispatchReport, NotificationError> {
    let mut report = DispatchReport::default();

    for alert in alerts {
        if let Some(email) = &contact.email {
            notifier.send(Notification {
                id: Uuid::new_v4(),
                user_id: alert.user_id.clone(),
                channel: NotificationChannel::Email,
                recipient: email.clone(),
                subject: Some(format!("Health Alert: {} - {}", alert.kind, alert.severity)),
                message: alert.message.clone(),
                created_at: Utc::now(),
            })?;
            report.emails += 1;
        }

        if let Some(phone) = &contact.phone {
            if alert.severity.is_urgent() {
                notifier.send(Notification {
                    id: Uuid::new_v4(),
                    user_id: alert.user_id.clone(),
                    channel: NotificationChannel::Sms,
                    recipient: phone.clone(),
                    subject: None,
                    message: format!("URGENT: {}", alert.message),
                    created_at: Utc::now(),
                })?;
                report.sms += 1;
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertKind, AlertSeverity};

    fn alert(severity: AlertSeverity, kind: AlertKind) -> Alert {
        Alert::new(severity, kind, "reading out of range", "u1", Utc::now())
    }

    #[test]
    fn emails_all_and_texts_urgent_only() {
        let alerts = vec![
            alert(AlertSeverity::Medium, AlertKind::Fever),
            alert(AlertSeverity::Critical, AlertKind::Hypoxia),
        ];
        let contact = ContactDetails {
            email: Some("pat@example.com".into()),
            phone: Some("+15550100".into()),
        };
        let mut notifier = SimulatedNotifier::new();
        let report = dispatch_alerts(&alerts, &contact, &mut notifier).unwrap();

        assert_eq!(report, DispatchReport { emails: 2, sms: 1 });
        let emails: Vec<_> = notifier.sent_on(NotificationChannel::Email).collect();
        assert_eq!(
            emails[1].subject.as_deref(),
            Some("Health Alert: Hypoxia - CRITICAL")
        );
        let sms: Vec<_> = notifier.sent_on(NotificationChannel::Sms).collect();
        assert_eq!(sms[0].message, "URGENT: reading out of range");
    }

    #[test]
    fn no_contact_sends_nothing() {
        let mut notifier = SimulatedNotifier::new();
        let report = dispatch_alerts(
            &[alert(AlertSeverity::High, AlertKind::Tachycardia)],
            &ContactDetails::default(),
            &mut notifier,
        )
        .unwrap();
        assert_eq!(report, DispatchReport::default());
        assert!(notifier.outbox().is_empty());
    }

    #[test]
    fn blank_recipient_is_rejected() {
        let contact = ContactDetails {
            email: Some("  ".into()),
            phone: None,
        };
        let mut notifier = SimulatedNotifier::new();
        assert!(matches!(
            dispatch_alerts(
                &[alert(AlertSeverity::High, AlertKind::Bradycardia)],
                &contact,
                &mut notifier
            ),
            Err(NotificationError::InvalidRecipient(_))
        ));
    }
}
