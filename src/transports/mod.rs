//! Notification transports
//!
//! A transport only knows how to put one alert on one channel. Routing,
//! suppression and recording the outcome are the dispatcher's job.

pub mod discord;
pub mod email;
pub mod telegram;
pub mod webhook;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

pub use email::EmailTransport;
pub use telegram::TelegramTransport;
pub use webhook::WebhookTransport;

use crate::alerts::{Alert, AlertDetails, Channel, Severity};
use crate::config::AlertsConfig;
use crate::error::DeliveryError;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    fn channel(&self) -> Channel;

    /// An inactive transport is skipped by the dispatcher, it is not a failure
    fn is_active(&self) -> bool;

    async fn send(&self, alert: &Alert) -> Result<(), DeliveryError>;
}

/// The transports available to the dispatcher, at most one per channel
#[derive(Clone, Default)]
pub struct Transports {
    by_channel: HashMap<Channel, Arc<dyn Transport>>,
}

impl Transports {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, transport: Arc<dyn Transport>) -> Self {
        self.by_channel.insert(transport.channel(), transport);
        self
    }

    pub fn get(&self, channel: Channel) -> Option<&Arc<dyn Transport>> {
        self.by_channel.get(&channel)
    }

    pub fn active_channels(&self) -> Vec<Channel> {
        let mut channels: Vec<Channel> = self
            .by_channel
            .iter()
            .filter(|(_, transport)| transport.is_active())
            .map(|(channel, _)| *channel)
            .collect();
        channels.sort_by_key(|channel| channel.as_str());
        channels
    }

    /// Build every enabled channel. A channel that is enabled but lacks
    /// credentials stays unregistered, which the dispatcher treats as inactive.
    pub fn from_config(config: &AlertsConfig) -> Self {
        let mut transports = Transports::new();

        if config.email.enabled {
            match EmailTransport::from_config(&config.email) {
                Ok(transport) => transports = transports.with(Arc::new(transport)),
                Err(e) => warn!("email channel disabled: {e}"),
            }
        } else {
            debug!("email channel not enabled");
        }

        if config.telegram.enabled {
            match TelegramTransport::from_config(&config.telegram) {
                Ok(transport) => transports = transports.with(Arc::new(transport)),
                Err(e) => warn!("telegram channel disabled: {e}"),
            }
        } else {
            debug!("telegram channel not enabled");
        }

        if config.webhook.enabled {
            match WebhookTransport::from_config(&config.webhook) {
                Ok(transport) => transports = transports.with(Arc::new(transport)),
                Err(e) => warn!("webhook channel disabled: {e}"),
            }
        } else {
            debug!("webhook channel not enabled");
        }

        transports
    }
}

pub(crate) fn severity_emoji(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "🚨",
        Severity::High => "⚠️",
        Severity::Medium => "🟡",
        Severity::Low => "ℹ️",
        Severity::Info => "📋",
    }
}

pub(crate) fn subject(alert: &Alert) -> String {
    format!(
        "[{}] {}",
        alert.severity().as_str().to_uppercase(),
        alert.kind()
    )
}

/// Detail lines shared by the text and HTML renderings
pub(crate) fn detail_lines(details: &AlertDetails) -> Vec<String> {
    match details {
        AlertDetails::CpuHigh { value, threshold }
        | AlertDetails::MemoryHigh { value, threshold }
        | AlertDetails::DiskHigh { value, threshold } => vec![
            format!("Value: {value:.1}%"),
            format!("Threshold: {threshold:.1}%"),
        ],
        AlertDetails::ZombieProcesses { count } => vec![format!("Zombie processes: {count}")],
        AlertDetails::PredictedFailure {
            probability,
            risk,
            top_features,
        } => {
            let mut lines = vec![
                format!("Probability: {:.1}%", probability * 100.0),
                format!("Risk: {risk}"),
            ];
            lines.extend(
                top_features
                    .iter()
                    .map(|feature| format!("{}: {:.2} (score {:.2})", feature.name, feature.value, feature.score)),
            );
            lines
        }
        AlertDetails::BackupSucceeded {
            backup_id,
            backup_type,
            size_mb,
            duration_secs,
        } => vec![
            format!("Backup: {backup_id}"),
            format!("Type: {backup_type}"),
            format!("Size: {size_mb:.2} MB"),
            format!("Duration: {duration_secs:.1}s"),
        ],
        AlertDetails::BackupFailed {
            backup_id,
            backup_type,
            error,
        } => {
            let mut lines = vec![];
            if let Some(backup_id) = backup_id {
                lines.push(format!("Backup: {backup_id}"));
            }
            if let Some(backup_type) = backup_type {
                lines.push(format!("Type: {backup_type}"));
            }
            lines.push(format!("Error: {error}"));
            lines
        }
    }
}

/// Plain text body used by email and as fallback text elsewhere
pub(crate) fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub(crate) fn plain_text(alert: &Alert) -> String {
    let mut body = format!(
        "{} {}\n\n{}\n\n",
        severity_emoji(alert.severity()),
        subject(alert),
        alert.message()
    );
    for line in detail_lines(alert.details()) {
        body.push_str(&line);
        body.push('\n');
    }
    body.push_str(&format!(
        "\nAlert: {}\nTime: {}\n",
        alert.id(),
        alert.created_at().to_rfc3339()
    ));
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EmailConfig, TelegramConfig, WebhookConfig};
    use chrono::Utc;

    #[test]
    fn test_disabled_channels_are_not_registered() {
        let transports = Transports::from_config(&AlertsConfig::default());

        assert!(transports.get(Channel::Email).is_none());
        assert!(transports.get(Channel::Telegram).is_none());
        assert!(transports.get(Channel::Webhook).is_none());
    }

    #[test]
    fn test_missing_credentials_leave_channel_inactive() {
        let config = AlertsConfig {
            telegram: TelegramConfig {
                enabled: true,
                bot_token: Some("token".to_string()),
                chat_id: None,
                ..Default::default()
            },
            webhook: WebhookConfig {
                enabled: true,
                url: Some("http://localhost:9999/hook".to_string()),
                ..Default::default()
            },
            email: EmailConfig {
                enabled: true,
                ..Default::default()
            },
            ..Default::default()
        };

        let transports = Transports::from_config(&config);

        assert!(transports.get(Channel::Telegram).is_none());
        assert!(transports.get(Channel::Email).is_none());
        assert_eq!(transports.active_channels(), vec![Channel::Webhook]);
    }

    #[test]
    fn test_plain_text_contains_details() {
        let alert = Alert::new(
            Severity::High,
            "CPU usage at 96.0%",
            AlertDetails::CpuHigh {
                value: 96.0,
                threshold: 80.0,
            },
            Utc::now(),
        );

        let text = plain_text(&alert);

        assert!(text.contains("[HIGH] cpu_high"));
        assert!(text.contains("Threshold: 80.0%"));
        assert!(text.contains(alert.id()));
    }
}
