//! Discord webhook payloads

use serde::Serialize;

use crate::alerts::{Alert, AlertDetails, Severity};

use super::{detail_lines, severity_emoji};

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Default)]
pub struct MessageBuilder {
    content: Option<String>,
    embeds: Vec<Embed>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(mut self, content: impl ToString) -> Self {
        self.content = Some(content.to_string());
        self
    }

    pub fn add_embed(mut self, embed: Embed) -> Self {
        self.embeds.push(embed);
        self
    }

    pub fn build(self) -> Message {
        Message {
            content: self.content,
            embeds: self.embeds,
        }
    }
}

fn color(severity: Severity) -> u32 {
    match severity {
        Severity::Critical => 15158332, // Red
        Severity::High => 15105570,     // Orange
        Severity::Medium => 16776960,   // Yellow
        Severity::Low => 5793266,       // Light blue
        Severity::Info => 9807270,      // Grey
    }
}

fn create_progress_bar(current: f64, limit: f64) -> String {
    let percentage = (current / limit) * 100.0;
    let filled = ((current / limit) * 10.0) as usize;
    let empty = 10 - filled.min(10);

    let bar = "█".repeat(filled.min(10)) + &"░".repeat(empty);
    let status_emoji = if percentage >= 100.0 {
        "🔴"
    } else if percentage >= 80.0 {
        "🟠"
    } else if percentage >= 60.0 {
        "🟡"
    } else {
        "🟢"
    };

    format!("{} `{}` {:.1}% of limit", status_emoji, bar, percentage)
}

pub fn build_alert_embed(alert: &Alert) -> Embed {
    let mut fields = vec![];

    match alert.details() {
        AlertDetails::CpuHigh { value, threshold }
        | AlertDetails::MemoryHigh { value, threshold }
        | AlertDetails::DiskHigh { value, threshold } => {
            fields.push(EmbedField {
                name: "📈 Current".to_string(),
                value: format!("{value:.1}%"),
                inline: true,
            });
            fields.push(EmbedField {
                name: "⚠️ Limit".to_string(),
                value: format!("{threshold:.1}%"),
                inline: true,
            });
            if *threshold > 0.0 {
                fields.push(EmbedField {
                    name: "📊 Status".to_string(),
                    value: create_progress_bar(*value, *threshold),
                    inline: false,
                });
            }
        }
        details => {
            fields.extend(detail_lines(details).into_iter().map(|line| {
                let (name, value) = line.split_once(": ").unwrap_or(("Detail", line.as_str()));
                EmbedField {
                    name: name.to_string(),
                    value: value.to_string(),
                    inline: true,
                }
            }));
        }
    }

    Embed {
        title: Some(format!(
            "{} {}",
            severity_emoji(alert.severity()),
            super::subject(alert)
        )),
        description: Some(alert.message().to_string()),
        color: Some(color(alert.severity())),
        fields,
        footer: Some(EmbedFooter {
            text: format!("Alert {}", alert.id()),
        }),
        timestamp: Some(alert.created_at().to_rfc3339()),
    }
}

pub fn build_alert_message(alert: &Alert, user_id: Option<&str>) -> Message {
    let mut builder = MessageBuilder::new().add_embed(build_alert_embed(alert));
    if let Some(user_id) = user_id {
        builder = builder.content(format!(
            "{} {} <@{user_id}>",
            severity_emoji(alert.severity()),
            alert.kind()
        ));
    }
    builder.build()
}
