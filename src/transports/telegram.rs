use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, instrument};

use super::{Transport, detail_lines, escape_html, severity_emoji};
use crate::alerts::{Alert, Channel};
use crate::config::TelegramConfig;
use crate::error::{ConfigError, DeliveryError};

#[derive(Debug, Clone, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: String,
    parse_mode: &'static str,
}

#[derive(Debug, Clone)]
pub struct TelegramTransport {
    client: Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramTransport {
    pub fn new(
        api_base: impl Into<String>,
        bot_token: impl Into<String>,
        chat_id: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.into(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
        }
    }

    pub fn from_config(config: &TelegramConfig) -> Result<Self, ConfigError> {
        let bot_token = config
            .bot_token
            .as_deref()
            .ok_or(ConfigError::MissingCredential {
                channel: "telegram",
                missing: "bot_token",
            })?;
        let chat_id = config
            .chat_id
            .as_deref()
            .ok_or(ConfigError::MissingCredential {
                channel: "telegram",
                missing: "chat_id",
            })?;

        Ok(Self::new(config.api_base.as_str(), bot_token, chat_id))
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.api_base.trim_end_matches('/'),
            self.bot_token
        )
    }

    fn format_message(alert: &Alert) -> String {
        let mut text = format!(
            "{} <b>{}</b>\n\n{}\n",
            severity_emoji(alert.severity()),
            alert.severity().as_str().to_uppercase(),
            escape_html(alert.message())
        );
        for line in detail_lines(alert.details()) {
            text.push_str(&format!("\n{}", escape_html(&line)));
        }
        text.push_str(&format!(
            "\n\n<i>{}</i>",
            alert.created_at().format("%Y-%m-%d %H:%M:%S UTC")
        ));
        text
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    fn channel(&self) -> Channel {
        Channel::Telegram
    }

    fn is_active(&self) -> bool {
        !self.bot_token.is_empty() && !self.chat_id.is_empty()
    }

    #[instrument(skip_all, fields(alert = alert.id()))]
    async fn send(&self, alert: &Alert) -> Result<(), DeliveryError> {
        let payload = SendMessage {
            chat_id: &self.chat_id,
            text: Self::format_message(alert),
            parse_mode: "HTML",
        };

        let response = self
            .client
            .post(self.endpoint())
            .json(&payload)
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

        debug!("sent telegram message to chat {}", self.chat_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{AlertDetails, Severity};
    use chrono::Utc;

    #[test]
    fn test_endpoint() {
        let transport = TelegramTransport::new("https://api.telegram.org/", "123:abc", "42");

        assert_eq!(
            transport.endpoint(),
            "https://api.telegram.org/bot123:abc/sendMessage"
        );
    }

    #[test]
    fn test_message_is_escaped() {
        let alert = Alert::new(
            Severity::Critical,
            "load <high> & rising",
            AlertDetails::ZombieProcesses { count: 4 },
            Utc::now(),
        );

        let text = TelegramTransport::format_message(&alert);

        assert!(text.contains("<b>CRITICAL</b>"));
        assert!(text.contains("load &lt;high&gt; &amp; rising"));
        assert!(text.contains("Zombie processes: 4"));
    }

    #[test]
    fn test_empty_chat_is_inactive() {
        assert!(!TelegramTransport::new("http://localhost", "token", "").is_active());
    }
}
