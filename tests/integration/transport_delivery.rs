//! Integration tests for HTTP transports
//!
//! These tests verify that:
//! - Telegram messages hit the bot API with the configured chat
//! - Webhook payloads follow the configured format
//! - Non-2xx answers surface as delivery failures
//! - A failing channel is recorded without blocking the others

use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::Utc;
use hostwarden::{
    alerts::{Alert, AlertDetails, Channel, Severity, pipeline::{AlertPipeline, PipelineOutcome}},
    config::{AlertsConfig, WebhookFormat},
    error::DeliveryError,
    storage::{MemoryBackend, StorageBackend},
    transports::{TelegramTransport, Transport, Transports, WebhookTransport},
};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::RecordingTransport;

fn disk_alert(severity: Severity) -> Alert {
    Alert::new(
        severity,
        "Disk usage at 97.0% (threshold 90%)",
        AlertDetails::DiskHigh {
            value: 97.0,
            threshold: 90.0,
        },
        Utc::now(),
    )
}

#[tokio::test]
async fn test_telegram_posts_to_bot_api() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bot123:abc/sendMessage"))
        .and(body_partial_json(serde_json::json!({
            "chat_id": "42",
            "parse_mode": "HTML"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;

    let transport = TelegramTransport::new(server.uri(), "123:abc", "42");
    transport.send(&disk_alert(Severity::High)).await.unwrap();
}

#[tokio::test]
async fn test_telegram_error_status_is_a_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&server)
        .await;

    let transport = TelegramTransport::new(server.uri(), "bad", "42");
    let result = transport.send(&disk_alert(Severity::High)).await;

    assert_matches!(result, Err(DeliveryError::Status { status: 401, .. }));
}

#[tokio::test]
async fn test_generic_webhook_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(body_partial_json(serde_json::json!({
            "type": "disk_high",
            "severity": "critical",
            "details": { "kind": "disk_high", "value": 97.0, "threshold": 90.0 }
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let transport = WebhookTransport::new(format!("{}/hook", server.uri()), WebhookFormat::Generic);
    transport.send(&disk_alert(Severity::Critical)).await.unwrap();
}

#[tokio::test]
async fn test_slack_webhook_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(serde_json::json!({
            "attachments": [{ "color": "danger" }]
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let transport = WebhookTransport::new(server.uri(), WebhookFormat::Slack);
    transport.send(&disk_alert(Severity::Critical)).await.unwrap();
}

#[tokio::test]
async fn test_unreachable_webhook_is_a_failure() {
    // nothing listens on the discard port
    let transport = WebhookTransport::new("http://127.0.0.1:9/hook", WebhookFormat::Generic);
    let result = transport.send(&disk_alert(Severity::Critical)).await;

    assert_matches!(result, Err(DeliveryError::Http(_)));
}

#[tokio::test]
async fn test_critical_alert_reaches_every_channel() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let telegram = RecordingTransport::new(Channel::Telegram);
    let email = RecordingTransport::new(Channel::Email);
    let transports = Transports::new()
        .with(telegram.clone())
        .with(email.clone())
        .with(Arc::new(WebhookTransport::new(
            format!("{}/hook", server.uri()),
            WebhookFormat::Generic,
        )));

    let storage: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let pipeline = AlertPipeline::new(&AlertsConfig::default(), transports, storage);

    let outcome = pipeline.submit(disk_alert(Severity::Critical), Utc::now()).await;

    let PipelineOutcome::Dispatched { report, .. } = outcome else {
        panic!("critical alert should be dispatched");
    };
    assert_eq!(telegram.sent().len(), 1);
    assert_eq!(email.sent().len(), 1);
    assert_eq!(report.alert.deliveries().len(), 3);
    assert!(!report.delivered());

    let failed: Vec<Channel> = report
        .alert
        .deliveries()
        .iter()
        .filter(|delivery| !delivery.success)
        .map(|delivery| delivery.channel)
        .collect();
    assert_eq!(failed, vec![Channel::Webhook]);

    let stats = pipeline.dispatch_stats();
    assert_eq!(stats.sent.get(&Channel::Telegram), Some(&1));
    assert_eq!(stats.failed.get(&Channel::Webhook), Some(&1));
}
