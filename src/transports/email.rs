use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, instrument};

use super::{Transport, detail_lines, escape_html, plain_text, subject};
use crate::alerts::{Alert, Channel, Severity};
use crate::config::EmailConfig;
use crate::error::{ConfigError, DeliveryError};

/// Port on which SMTP servers expect implicit TLS instead of STARTTLS
const SMTPS_PORT: u16 = 465;

#[derive(Clone)]
pub struct EmailTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

fn parse_mailbox(address: &str) -> Result<Mailbox, DeliveryError> {
    address
        .parse::<Mailbox>()
        .map_err(|e| DeliveryError::Address {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

impl EmailTransport {
    pub fn new(
        mailer: AsyncSmtpTransport<Tokio1Executor>,
        from: &str,
        to: &[String],
    ) -> Result<Self, DeliveryError> {
        Ok(Self {
            mailer,
            from: parse_mailbox(from)?,
            to: to
                .iter()
                .map(|address| parse_mailbox(address))
                .collect::<Result<_, _>>()?,
        })
    }

    pub fn from_config(config: &EmailConfig) -> Result<Self, ConfigError> {
        let missing = |missing| ConfigError::MissingCredential {
            channel: "email",
            missing,
        };

        let host = config.smtp_host.as_deref().ok_or_else(|| missing("smtp_host"))?;
        let from = config.from.as_deref().ok_or_else(|| missing("from"))?;
        if config.to.is_empty() {
            return Err(missing("to"));
        }

        let builder = if config.smtp_port == SMTPS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
        }
        .map_err(|e| ConfigError::Invalid {
            field: "alerts.email.smtp_host",
            reason: e.to_string(),
        })?
        .port(config.smtp_port);

        let builder = match (&config.username, &config.password) {
            (Some(username), Some(password)) => {
                builder.credentials(Credentials::new(username.clone(), password.clone()))
            }
            _ => builder,
        };

        Self::new(builder.build(), from, &config.to).map_err(|e| ConfigError::Invalid {
            field: "alerts.email",
            reason: e.to_string(),
        })
    }

    fn message(&self, alert: &Alert) -> Result<Message, DeliveryError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(subject(alert));
        for to in &self.to {
            builder = builder.to(to.clone());
        }

        builder
            .multipart(MultiPart::alternative_plain_html(
                plain_text(alert),
                html_body(alert),
            ))
            .map_err(|e| DeliveryError::Smtp(e.to_string()))
    }
}

fn severity_color(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "#dc3545",
        Severity::High => "#fd7e14",
        Severity::Medium => "#ffc107",
        Severity::Low => "#0dcaf0",
        Severity::Info => "#6c757d",
    }
}

/// HTML alternative: a colored severity banner above the message and details
fn html_body(alert: &Alert) -> String {
    let details: String = detail_lines(alert.details())
        .iter()
        .map(|line| format!("<li>{}</li>", escape_html(line)))
        .collect();

    format!(
        r#"<!DOCTYPE html>
<html>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
<div style="background-color: {color}; color: #fff; padding: 12px 16px;">
<strong>{severity}</strong> {kind}
</div>
<div style="padding: 16px;">
<p>{message}</p>
<ul>{details}</ul>
<p style="color: #6c757d; font-size: 12px;">Alert {id} at {time}</p>
</div>
</body>
</html>
"#,
        color = severity_color(alert.severity()),
        severity = alert.severity().as_str().to_uppercase(),
        kind = alert.kind(),
        message = escape_html(alert.message()),
        id = alert.id(),
        time = alert.created_at().to_rfc3339(),
    )
}

#[async_trait]
impl Transport for EmailTransport {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    fn is_active(&self) -> bool {
        !self.to.is_empty()
    }

    #[instrument(skip_all, fields(alert = alert.id()))]
    async fn send(&self, alert: &Alert) -> Result<(), DeliveryError> {
        let message = self.message(alert)?;

        self.mailer
            .send(message)
            .await
            .map_err(|e| DeliveryError::Smtp(e.to_string()))?;

        debug!("sent email to {} recipient(s)", self.to.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{AlertDetails, Severity};
    use chrono::Utc;

    fn local_mailer() -> AsyncSmtpTransport<Tokio1Executor> {
        AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous("localhost")
            .port(2525)
            .build()
    }

    #[test]
    fn test_invalid_recipient_is_rejected() {
        let result = EmailTransport::new(
            local_mailer(),
            "monitor@example.com",
            &["not an address".to_string()],
        );

        assert!(matches!(result, Err(DeliveryError::Address { .. })));
    }

    #[tokio::test]
    async fn test_message_has_subject_and_recipients() {
        let transport = EmailTransport::new(
            local_mailer(),
            "monitor@example.com",
            &["ops@example.com".to_string(), "oncall@example.com".to_string()],
        )
        .unwrap();
        let alert = Alert::new(
            Severity::Medium,
            "Disk usage at 92.0%",
            AlertDetails::DiskHigh {
                value: 92.0,
                threshold: 90.0,
            },
            Utc::now(),
        );

        let message = transport.message(&alert).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(transport.is_active());
        assert!(raw.contains("Subject: [MEDIUM] disk_high"));
        assert!(raw.contains("ops@example.com"));
        assert!(raw.contains("oncall@example.com"));
        assert!(raw.contains("multipart/alternative"));
        assert!(raw.contains("text/plain"));
        assert!(raw.contains("text/html"));
    }

    #[test]
    fn test_html_body_is_colored_and_escaped() {
        let alert = Alert::new(
            Severity::Critical,
            "load <high> & rising",
            AlertDetails::CpuHigh {
                value: 99.0,
                threshold: 80.0,
            },
            Utc::now(),
        );

        let html = html_body(&alert);

        assert!(html.contains("#dc3545"));
        assert!(html.contains("load &lt;high&gt; &amp; rising"));
        assert!(html.contains("<li>Value: 99.0%</li>"));
        assert!(html.contains(alert.id()));
    }

    #[test]
    fn test_from_config_requires_recipients() {
        let config = EmailConfig {
            enabled: true,
            smtp_host: Some("smtp.example.com".to_string()),
            from: Some("monitor@example.com".to_string()),
            ..Default::default()
        };

        assert!(matches!(
            EmailTransport::from_config(&config),
            Err(ConfigError::MissingCredential { missing: "to", .. })
        ));
    }
}
