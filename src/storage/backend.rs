//! Storage backend trait definition
//!
//! This module defines the core `StorageBackend` trait that all
//! storage implementations must implement.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::StorageResult;
use super::schema::{AlertRow, MetricRow};
use crate::alerts::AlertKind;
use crate::backup::{BackupFeedback, BackupRecord};

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: std::collections::HashMap<String, String>,
}

/// Trait for persistent storage backends
///
/// The store is append-only for metrics, alerts and feedback. Backup records
/// are the one exception: the retention sweep deletes successful records
/// once they fall out of the retention horizon.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync` as they are shared by every
/// activity of the orchestrator.
///
/// ## Error Handling
///
/// Methods return `StorageResult<T>` which wraps `StorageError`.
/// Implementations should convert backend-specific errors to
/// `StorageError` variants.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    // ========================================================================
    // Metrics
    // ========================================================================

    /// Persist the snapshot of one monitoring tick
    async fn insert_metric(&self, metric: MetricRow) -> StorageResult<()>;

    /// Metrics collected at or after `since`, oldest first
    async fn metrics_since(&self, since: DateTime<Utc>) -> StorageResult<Vec<MetricRow>>;

    /// Number of metric rows collected at or after `since`
    async fn count_metrics_since(&self, since: DateTime<Utc>) -> StorageResult<u64>;

    /// Delete metrics older than the specified timestamp
    ///
    /// Returns the number of metrics deleted.
    async fn cleanup_old_metrics(&self, before: DateTime<Utc>) -> StorageResult<usize>;

    // ========================================================================
    // Alerts
    // ========================================================================

    /// Persist an admitted alert with its delivery outcomes as one row
    async fn insert_alert(&self, alert: AlertRow) -> StorageResult<()>;

    /// Number of alerts of one type created at or after `since`
    async fn count_alerts_by_type_since(
        &self,
        kind: AlertKind,
        since: DateTime<Utc>,
    ) -> StorageResult<u64>;

    // ========================================================================
    // Backups
    // ========================================================================

    /// Persist the record of one backup attempt
    async fn insert_backup_record(&self, record: &BackupRecord) -> StorageResult<()>;

    async fn backup_record(&self, id: &str) -> StorageResult<Option<BackupRecord>>;

    /// Most recent successful backup of any type
    async fn latest_successful_backup(&self) -> StorageResult<Option<BackupRecord>>;

    /// Most recent successful full backup
    async fn latest_full_backup(&self) -> StorageResult<Option<BackupRecord>>;

    /// The `limit` most recent backup records, oldest first
    async fn backup_history(&self, limit: usize) -> StorageResult<Vec<BackupRecord>>;

    /// Successful records started before `before`, i.e. what the retention
    /// sweep is about to delete
    async fn successful_backups_older_than(
        &self,
        before: DateTime<Utc>,
    ) -> StorageResult<Vec<BackupRecord>>;

    /// Delete successful backup records started before `before`.
    /// Failed records are kept.
    ///
    /// Returns the number of records deleted.
    async fn delete_backup_records_older_than(&self, before: DateTime<Utc>)
    -> StorageResult<usize>;

    async fn insert_backup_feedback(&self, feedback: &BackupFeedback) -> StorageResult<()>;

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Check backend health
    ///
    /// Performs a lightweight operation to verify the backend
    /// is operational (e.g., ping database, check file access).
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Get backend-specific statistics
    ///
    /// Returns human-readable stats about the backend
    /// (e.g., "SQLite: 1200 metrics, 35 alerts, 12 backups, 4.50 MB on disk").
    async fn get_stats(&self) -> StorageResult<String>;

    /// Close the backend and release resources
    async fn close(&self) -> StorageResult<()>;
}
