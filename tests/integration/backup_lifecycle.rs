//! Integration tests for backup execution
//!
//! These tests verify that:
//! - Every execute call leaves exactly one record
//! - The space check runs before anything is written
//! - Incremental backups only copy what changed since the reference
//! - Restore brings back the files of a zip or directory backup
//! - Retention removes expired artifacts but keeps failed records

use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{TimeDelta, Utc};
use hostwarden::{
    backup::{BackupExecutor, BackupOutcome, BackupRecord, BackupType, FixedSpaceProbe, Strategy},
    config::BackupConfig,
    error::BackupError,
    storage::{MemoryBackend, StorageBackend},
};
use pretty_assertions::assert_eq;
use tempfile::{TempDir, tempdir};

use crate::helpers::write_file;

fn strategy(backup_type: BackupType, compress: bool) -> Strategy {
    Strategy {
        backup_type,
        compress,
        estimated_size_mb: 1.0,
        suggested_hour: 2,
        confidence: 0.85,
        days_since_last_backup: 1.0,
    }
}

fn setup(available_mb: f64) -> (TempDir, Arc<dyn StorageBackend>, BackupExecutor) {
    let root = tempdir().unwrap();
    write_file(root.path(), "data/etc/app.conf", "listen = 8080\n");
    write_file(root.path(), "data/var/state.json", "{\"version\": 3}");

    let config = BackupConfig {
        sources: vec![root.path().join("data")],
        destination: root.path().join("backups"),
        ..Default::default()
    };
    let storage: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let executor = BackupExecutor::new(&config, storage.clone(), Arc::new(FixedSpaceProbe(available_mb)));

    (root, storage, executor)
}

#[tokio::test]
async fn test_full_compressed_backup() {
    let (root, storage, executor) = setup(10_000.0);

    let outcome = executor.execute(&strategy(BackupType::Full, true)).await;

    let record = outcome.record().clone();
    assert!(outcome.is_success(), "{outcome:?}");
    assert_eq!(record.backup_type, BackupType::Full);
    assert_eq!(record.targets, vec![root.path().join("data")]);

    let artifact = record.path.clone().unwrap();
    assert_eq!(artifact.extension().unwrap(), "zip");
    assert!(artifact.is_file());
    assert!(!artifact.with_extension("").exists());

    let history = storage.backup_history(10).await.unwrap();
    assert_eq!(history, vec![record]);
}

#[tokio::test]
async fn test_insufficient_space_writes_nothing() {
    let (root, storage, executor) = setup(0.0);

    let outcome = executor.execute(&strategy(BackupType::Full, true)).await;

    assert_matches!(&outcome, BackupOutcome::Failed { error: BackupError::Space { available_mb, .. }, .. } if *available_mb == 0.0);
    let record = outcome.record();
    assert!(!record.success);
    assert!(record.error.as_ref().unwrap().contains("insufficient disk space"));
    assert!(record.path.is_none());

    let written = std::fs::read_dir(root.path().join("backups"))
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(written, 0);

    // the failed attempt is still on record
    let history = storage.backup_history(10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(!history[0].success);
}

#[tokio::test]
async fn test_concurrent_executions_each_leave_one_record() {
    let (_root, storage, executor) = setup(10_000.0);
    let executor = Arc::new(executor);

    let runs = (0..3).map(|_| {
        let executor = executor.clone();
        tokio::spawn(async move { executor.execute(&strategy(BackupType::Full, false)).await })
    });
    let outcomes = futures::future::join_all(runs).await;

    let mut ids: Vec<String> = outcomes
        .into_iter()
        .map(|outcome| outcome.unwrap().record().id.clone())
        .collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 3);
    assert_eq!(storage.backup_history(10).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_incremental_copies_only_changes() {
    let (root, _storage, executor) = setup(10_000.0);

    let full = executor.execute(&strategy(BackupType::Full, false)).await;
    assert!(full.is_success());

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    write_file(root.path(), "data/var/state.json", "{\"version\": 4}");

    let incremental = executor.execute(&strategy(BackupType::Incremental, false)).await;
    assert!(incremental.is_success(), "{incremental:?}");

    let record = incremental.record();
    assert_eq!(record.targets, vec![root.path().join("data/var/state.json")]);

    let dir = record.path.clone().unwrap();
    assert!(dir.join("data/var/state.json").is_file());
    assert!(!dir.join("data/etc/app.conf").exists());
    assert!(dir.join("metadata.json").is_file());
}

#[tokio::test]
async fn test_incremental_without_reference_copies_roots() {
    let (root, _storage, executor) = setup(10_000.0);

    let outcome = executor.execute(&strategy(BackupType::Differential, false)).await;

    assert!(outcome.is_success());
    assert_eq!(outcome.record().targets, vec![root.path().join("data")]);
}

#[tokio::test]
async fn test_restore_zip_backup() {
    let (root, _storage, executor) = setup(10_000.0);
    let outcome = executor.execute(&strategy(BackupType::Full, true)).await;
    let id = outcome.record().id.clone();

    let target = root.path().join("restored");
    let restored = executor.restore(&id, &target).await.unwrap();

    // two data files plus metadata.json
    assert_eq!(restored, 3);
    assert_eq!(
        std::fs::read_to_string(target.join("data/etc/app.conf")).unwrap(),
        "listen = 8080\n"
    );
}

#[tokio::test]
async fn test_restore_unknown_backup() {
    let (root, _storage, executor) = setup(10_000.0);

    let result = executor.restore("does-not-exist", &root.path().join("restored")).await;

    assert_matches!(result, Err(BackupError::NotFound(id)) if id == "does-not-exist");
}

#[tokio::test]
async fn test_restore_failed_backup_is_not_found() {
    let (root, _storage, executor) = setup(0.0);
    let outcome = executor.execute(&strategy(BackupType::Full, true)).await;

    let result = executor
        .restore(&outcome.record().id, &root.path().join("restored"))
        .await;

    assert_matches!(result, Err(BackupError::NotFound(_)));
}

#[tokio::test]
async fn test_retention_removes_expired_artifacts() {
    let (root, storage, executor) = setup(10_000.0);

    let expired_dir = root.path().join("backups/backup_old");
    std::fs::create_dir_all(&expired_dir).unwrap();
    std::fs::write(expired_dir.join("metadata.json"), "{}").unwrap();

    let long_ago = Utc::now() - TimeDelta::days(60);
    let old = |id: &str, success: bool, path| BackupRecord {
        id: id.to_string(),
        started_at: long_ago,
        duration_secs: 1.0,
        backup_type: BackupType::Full,
        targets: vec![],
        size_mb: 1.0,
        success,
        error: (!success).then(|| "disk full".to_string()),
        path,
    };
    storage
        .insert_backup_record(&old("old", true, Some(expired_dir.clone())))
        .await
        .unwrap();
    storage
        .insert_backup_record(&old("old-failed", false, None))
        .await
        .unwrap();

    let outcome = executor.execute(&strategy(BackupType::Full, true)).await;

    assert_matches!(outcome, BackupOutcome::Succeeded { pruned: 1, .. });
    assert!(!expired_dir.exists());
    assert!(storage.backup_record("old").await.unwrap().is_none());
    assert!(storage.backup_record("old-failed").await.unwrap().is_some());
}
