use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use super::{Transport, detail_lines, discord, plain_text, severity_emoji, subject};
use crate::alerts::{Alert, Channel, Severity};
use crate::config::{WebhookConfig, WebhookFormat};
use crate::error::{ConfigError, DeliveryError};

#[derive(Debug, Clone)]
pub struct WebhookTransport {
    client: Client,
    url: String,
    format: WebhookFormat,
    user_id: Option<String>,
}

impl WebhookTransport {
    pub fn new(url: impl Into<String>, format: WebhookFormat) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            format,
            user_id: None,
        }
    }

    /// Mention a Discord user in every message
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn from_config(config: &WebhookConfig) -> Result<Self, ConfigError> {
        let url = config.url.as_deref().ok_or(ConfigError::MissingCredential {
            channel: "webhook",
            missing: "url",
        })?;

        let mut transport = Self::new(url, config.format);
        transport.user_id = config.user_id.clone();
        Ok(transport)
    }

    pub fn payload(&self, alert: &Alert) -> Value {
        match self.format {
            WebhookFormat::Generic => json!({
                "id": alert.id(),
                "type": alert.kind(),
                "severity": alert.severity(),
                "message": alert.message(),
                "details": alert.details(),
                "timestamp": alert.created_at().to_rfc3339(),
            }),
            WebhookFormat::Slack => {
                let fields: Vec<Value> = detail_lines(alert.details())
                    .into_iter()
                    .map(|line| json!({ "value": line, "short": true }))
                    .collect();

                json!({
                    "text": format!("{} {}", severity_emoji(alert.severity()), subject(alert)),
                    "attachments": [{
                        "color": slack_color(alert.severity()),
                        "title": alert.message(),
                        "fields": fields,
                        "fallback": plain_text(alert),
                        "ts": alert.created_at().timestamp(),
                    }],
                })
            }
            WebhookFormat::Discord => {
                // a Message is always serializable
                serde_json::to_value(discord::build_alert_message(alert, self.user_id.as_deref()))
                    .unwrap_or(Value::Null)
            }
        }
    }
}

fn slack_color(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "danger",
        Severity::High | Severity::Medium => "warning",
        Severity::Low | Severity::Info => "good",
    }
}

#[async_trait]
impl Transport for WebhookTransport {
    fn channel(&self) -> Channel {
        Channel::Webhook
    }

    fn is_active(&self) -> bool {
        !self.url.is_empty()
    }

    #[instrument(skip_all, fields(alert = alert.id()))]
    async fn send(&self, alert: &Alert) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.url)
            .json(&self.payload(alert))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        debug!("delivered webhook ({:?})", self.format);
        Ok(())
    }
}
