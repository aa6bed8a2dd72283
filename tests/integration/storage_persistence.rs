//! Integration tests for SQLite persistence
//!
//! These tests verify that:
//! - Everything written survives closing and reopening the database
//! - An engine restart warms up from the stored history

use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use hostwarden::{
    alerts::{Alert, AlertDetails, AlertKind, Severity},
    backup::{BackupFeedback, BackupRecord, BackupType},
    orchestrator::Components,
    storage::{AlertRow, MetricRow, StorageBackend, sqlite::SqliteBackend},
    transports::Transports,
};
use tempfile::tempdir;

use crate::helpers::{ScriptedSource, create_test_config, create_test_snapshot};

#[tokio::test]
async fn test_data_survives_reopen() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("hostwarden.db");
    let now = Utc::now();

    {
        let backend = SqliteBackend::new(&db_path).await.unwrap();
        backend
            .insert_metric(MetricRow::from_snapshot(&create_test_snapshot(55.0, 60.0, 70.0)))
            .await
            .unwrap();

        let alert = Alert::new(
            Severity::Medium,
            "Memory usage at 88.0% (threshold 85%)",
            AlertDetails::MemoryHigh {
                value: 88.0,
                threshold: 85.0,
            },
            now,
        );
        backend
            .insert_alert(AlertRow::from_alert(&alert, 42))
            .await
            .unwrap();

        let record = BackupRecord {
            id: "20240515_020000_000000".to_string(),
            started_at: now - TimeDelta::hours(1),
            duration_secs: 12.5,
            backup_type: BackupType::Full,
            targets: vec![dir.path().join("data")],
            size_mb: 128.0,
            success: true,
            error: None,
            path: Some(dir.path().join("backups/backup_20240515_020000_000000.zip")),
        };
        backend.insert_backup_record(&record).await.unwrap();
        backend
            .insert_backup_feedback(&BackupFeedback {
                backup_id: record.id.clone(),
                utility: 4,
                performance: 5,
                comment: Some("quick".to_string()),
                created_at: now,
            })
            .await
            .unwrap();

        backend.close().await.unwrap();
    }

    let backend = SqliteBackend::new(&db_path).await.unwrap();
    let since = now - TimeDelta::days(1);

    let metrics = backend.metrics_since(since).await.unwrap();
    assert_eq!(metrics.len(), 1);
    assert_eq!(metrics[0].cpu_percent, 55.0);
    assert_eq!(metrics[0].snapshot.memory.percent, 60.0);

    assert_eq!(
        backend
            .count_alerts_by_type_since(AlertKind::MemoryHigh, since)
            .await
            .unwrap(),
        1
    );

    let latest = backend.latest_full_backup().await.unwrap().unwrap();
    assert_eq!(latest.id, "20240515_020000_000000");
    assert_eq!(latest.size_mb, 128.0);
    assert!(backend.health_check().await.unwrap().healthy);
}

#[tokio::test]
async fn test_warm_up_trains_on_stored_history() {
    let dir = tempdir().unwrap();
    let config = create_test_config(dir.path());
    let backend = SqliteBackend::new(dir.path().join("hostwarden.db")).await.unwrap();

    for minutes in 0..120 {
        let mut snapshot = create_test_snapshot(20.0 + (minutes % 7) as f32, 40.0, 50.0);
        snapshot.timestamp = Utc::now() - TimeDelta::minutes(minutes);
        backend
            .insert_metric(MetricRow::from_snapshot(&snapshot))
            .await
            .unwrap();
    }

    let storage: Arc<dyn StorageBackend> = Arc::new(backend);
    let components = Components::assemble(
        &config,
        storage,
        Arc::new(ScriptedSource::healthy()),
        Transports::new(),
    );
    assert!(!components.predictor.is_trained());

    components.warm_up(Utc::now()).await;

    assert!(components.predictor.is_trained());
}
