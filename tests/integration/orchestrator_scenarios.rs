//! End-to-end scenarios through the orchestrator
//!
//! These tests verify that:
//! - A monitoring tick flows from the source through the pipeline into storage
//! - Cooldown suppression shows up in the status counters
//! - Acquisition failures count as failures without stopping the loop
//! - Backups and retraining can be triggered on demand
//! - A backup without enough free space is aborted and raises a high alert
//! - A failed retraining pass backs off, and shutdown cuts the backoff short
//! - Shutdown stops every activity and closes storage

use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{TimeDelta, Utc};
use hostwarden::{
    actors::RetrainReport,
    alerts::{AlertKind, Channel, Severity},
    backup::{BackupOutcome, FixedSpaceProbe},
    error::BackupError,
    orchestrator::{Components, Orchestrator},
    storage::{MemoryBackend, MetricRow, StorageBackend},
    transports::Transports,
};
use tempfile::tempdir;

use crate::helpers::{RecordingTransport, ScriptedSource, create_test_config, create_test_snapshot, write_file};

/// The monitor ticks once as soon as it starts. Commands queue behind that
/// tick, so once it began, `run_now` results are deterministic.
async fn wait_for_first_tick(source: &ScriptedSource) {
    for _ in 0..200 {
        if source.calls() > 0 {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("monitor never ticked");
}

#[tokio::test]
async fn test_monitor_tick_dispatches_and_persists() {
    let root = tempdir().unwrap();
    let config = create_test_config(root.path());

    let storage: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let source = Arc::new(ScriptedSource::new(vec![
        Ok(create_test_snapshot(20.0, 40.0, 50.0)),
        Ok(create_test_snapshot(96.0, 40.0, 50.0)),
    ]));
    let telegram = RecordingTransport::new(Channel::Telegram);
    let email = RecordingTransport::new(Channel::Email);
    let transports = Transports::new().with(telegram.clone()).with(email.clone());

    let components = Components::assemble(&config, storage.clone(), source.clone(), transports);
    let orchestrator = Orchestrator::start(&config, components);
    wait_for_first_tick(&source).await;

    let first = orchestrator.monitor().run_now().await.unwrap();
    assert_eq!(first.raised, 1);
    assert_eq!(first.dispatched, 1);
    assert!(first.metric_persisted);
    assert_eq!(telegram.sent(), vec![AlertKind::CpuHigh]);
    assert_eq!(email.sent(), vec![AlertKind::CpuHigh]);

    // same condition again, inside the cooldown window
    let second = orchestrator.monitor().run_now().await.unwrap();
    assert_eq!(second.dispatched, 0);
    assert_eq!(second.suppressed, 1);
    assert_eq!(telegram.sent().len(), 1);

    let status = orchestrator.status();
    assert_eq!(status.total_alerts, 1);
    assert_eq!(status.suppressed_alerts, 1);
    assert_eq!(status.failures, 0);
    assert_eq!(status.last_cpu_percent, Some(96.0));
    assert!(status.last_tick_at.is_some());

    let since = Utc::now() - TimeDelta::hours(1);
    assert_eq!(storage.count_metrics_since(since).await.unwrap(), 3);
    assert_eq!(
        storage
            .count_alerts_by_type_since(AlertKind::CpuHigh, since)
            .await
            .unwrap(),
        1
    );

    orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_acquisition_failure_is_counted() {
    let root = tempdir().unwrap();
    let config = create_test_config(root.path());

    let source = Arc::new(ScriptedSource::new(vec![
        Ok(create_test_snapshot(10.0, 10.0, 10.0)),
        Err(()),
        Ok(create_test_snapshot(10.0, 10.0, 10.0)),
    ]));
    let components = Components::assemble(
        &config,
        Arc::new(MemoryBackend::new()),
        source.clone(),
        Transports::new(),
    );
    let orchestrator = Orchestrator::start(&config, components);
    wait_for_first_tick(&source).await;

    assert!(orchestrator.monitor().run_now().await.is_err());
    assert_eq!(orchestrator.status().failures, 1);

    // the loop keeps going after a failed tick
    let report = orchestrator.monitor().run_now().await.unwrap();
    assert_eq!(report.raised, 0);
    assert_eq!(orchestrator.status().failures, 1);

    orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_backup_on_demand() {
    let root = tempdir().unwrap();
    write_file(root.path(), "data/notes.txt", "remember the milk");
    let config = create_test_config(root.path());

    let storage: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let components = Components::assemble(
        &config,
        storage.clone(),
        Arc::new(ScriptedSource::healthy()),
        Transports::new(),
    );
    let orchestrator = Orchestrator::start(&config, components);

    let outcome = orchestrator.backup().unwrap().run_now().await.unwrap();

    assert_matches!(&outcome, BackupOutcome::Succeeded { .. });
    assert_eq!(outcome.record().backup_type, hostwarden::backup::BackupType::Full);
    assert!(outcome.record().path.as_ref().unwrap().exists());
    assert_eq!(orchestrator.status().total_backups, 1);
    assert_eq!(
        orchestrator
            .components()
            .pipeline
            .dispatch_stats()
            .by_kind
            .get(&AlertKind::BackupSucceeded),
        Some(&1)
    );

    orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_backup_without_space_raises_high_alert() {
    let root = tempdir().unwrap();
    write_file(root.path(), "data/notes.txt", "remember the milk");
    let config = create_test_config(root.path());

    let storage: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let telegram = RecordingTransport::new(Channel::Telegram);
    let components = Components::assemble(
        &config,
        storage.clone(),
        Arc::new(ScriptedSource::healthy()),
        Transports::new().with(telegram.clone()),
    )
    .with_space_probe(&config, Arc::new(FixedSpaceProbe(0.0)));
    let orchestrator = Orchestrator::start(&config, components);

    let outcome = orchestrator.backup().unwrap().run_now().await.unwrap();

    assert_matches!(
        &outcome,
        BackupOutcome::Failed {
            error: BackupError::Space { .. },
            ..
        }
    );
    assert_eq!(telegram.sent(), vec![AlertKind::BackupFailed]);

    let stats = orchestrator.components().pipeline.dispatch_stats();
    assert_eq!(stats.by_kind.get(&AlertKind::BackupFailed), Some(&1));
    assert_eq!(stats.by_severity.get(&Severity::High), Some(&1));

    let status = orchestrator.status();
    assert_eq!(status.failures, 1);
    assert_eq!(status.total_backups, 0);

    let history = storage.backup_history(10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(!history[0].success);
    assert!(history[0].path.is_none());

    orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_disabled_activities_have_no_handle() {
    let root = tempdir().unwrap();
    let mut config = create_test_config(root.path());
    config.backup.enabled = false;
    config.retraining.enabled = false;

    let components = Components::assemble(
        &config,
        Arc::new(MemoryBackend::new()),
        Arc::new(ScriptedSource::healthy()),
        Transports::new(),
    );
    let orchestrator = Orchestrator::start(&config, components);

    assert!(orchestrator.backup().is_none());
    assert!(orchestrator.retrain().is_none());

    orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_retraining_waits_for_enough_rows() {
    let root = tempdir().unwrap();
    let mut config = create_test_config(root.path());
    config.retraining.min_new_rows = 10;

    let storage: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let components = Components::assemble(
        &config,
        storage.clone(),
        Arc::new(ScriptedSource::healthy()),
        Transports::new(),
    );
    let orchestrator = Orchestrator::start(&config, components);
    let retrain = orchestrator.retrain().unwrap();

    let report = retrain.run_now().await.unwrap();
    assert_matches!(report, RetrainReport::Skipped { new_rows, required: 10 } if new_rows <= 1);

    for minutes in 0..20 {
        let mut snapshot = create_test_snapshot(20.0 + minutes as f32, 40.0, 50.0);
        snapshot.timestamp = Utc::now() - TimeDelta::minutes(minutes);
        storage
            .insert_metric(MetricRow::from_snapshot(&snapshot))
            .await
            .unwrap();
    }

    let report = retrain.run_now().await.unwrap();
    assert_matches!(report, RetrainReport::Retrained { metrics_removed: 0, .. });

    orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_retraining_failure_backs_off_until_shutdown() {
    let root = tempdir().unwrap();
    let mut config = create_test_config(root.path());
    config.retraining.failure_backoff_secs = 3600;

    let storage: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let source = Arc::new(ScriptedSource::healthy());
    let components = Components::assemble(&config, storage.clone(), source.clone(), Transports::new());
    let orchestrator = Orchestrator::start(&config, components);
    wait_for_first_tick(&source).await;

    storage.close().await.unwrap();
    let retrain = orchestrator.retrain().unwrap().clone();
    let pending = tokio::spawn(async move { retrain.run_now().await });

    for _ in 0..200 {
        if orchestrator.status().failures > 0 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(orchestrator.status().failures, 1);
    assert!(!pending.is_finished());

    tokio::time::timeout(std::time::Duration::from_secs(5), orchestrator.shutdown())
        .await
        .expect("backoff should end on shutdown")
        .unwrap();

    assert!(pending.await.unwrap().is_err());
}

#[tokio::test]
async fn test_shutdown_stops_every_activity() {
    let root = tempdir().unwrap();
    let config = create_test_config(root.path());

    let storage: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let source = Arc::new(ScriptedSource::healthy());
    let components = Components::assemble(&config, storage.clone(), source.clone(), Transports::new());
    let orchestrator = Orchestrator::start(&config, components);
    let monitor = orchestrator.monitor().clone();

    wait_for_first_tick(&source).await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(source.calls(), 1);

    tokio::time::timeout(std::time::Duration::from_secs(5), orchestrator.shutdown())
        .await
        .expect("shutdown should not hang")
        .unwrap();

    assert!(monitor.run_now().await.is_err());
    assert!(!storage.health_check().await.unwrap().healthy);
}
