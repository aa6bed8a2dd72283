//! In-memory storage backend (no persistence)
//!
//! Used when storage is configured as `none` and throughout the tests.
//!
//! ## Limitations
//!
//! - **No persistence**: All data lost on restart
//! - **Bounded metrics**: Only the most recent metrics are kept

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use super::backend::{HealthStatus, StorageBackend};
use super::error::{StorageError, StorageResult};
use super::schema::{AlertRow, MetricRow};
use crate::alerts::AlertKind;
use crate::backup::{BackupFeedback, BackupRecord, BackupType};

/// Maximum metrics to keep in memory
const MAX_METRICS: usize = 10_000;

#[derive(Default)]
struct Tables {
    metrics: VecDeque<MetricRow>,
    alerts: Vec<AlertRow>,
    backups: Vec<BackupRecord>,
    feedback: Vec<BackupFeedback>,
    closed: bool,
}

impl Tables {
    fn ensure_open(&self) -> StorageResult<()> {
        if self.closed {
            return Err(StorageError::Closed);
        }
        Ok(())
    }

    fn latest_backup_where(&self, predicate: impl Fn(&BackupRecord) -> bool) -> Option<BackupRecord> {
        self.backups
            .iter()
            .filter(|record| predicate(record))
            .max_by_key(|record| record.started_at)
            .cloned()
    }
}

/// In-memory storage backend
///
/// Metrics are kept in a ring buffer with a fixed capacity. When the buffer
/// is full, oldest metrics are evicted.
#[derive(Default)]
pub struct MemoryBackend {
    tables: RwLock<Tables>,
}

impl MemoryBackend {
    /// Create a new in-memory backend
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn insert_metric(&self, metric: MetricRow) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        tables.ensure_open()?;

        if tables.metrics.len() >= MAX_METRICS {
            tables.metrics.pop_front();
        }
        tables.metrics.push_back(metric);
        Ok(())
    }

    async fn metrics_since(&self, since: DateTime<Utc>) -> StorageResult<Vec<MetricRow>> {
        let tables = self.tables.read().await;
        tables.ensure_open()?;

        let mut metrics: Vec<MetricRow> = tables
            .metrics
            .iter()
            .filter(|metric| metric.timestamp >= since)
            .cloned()
            .collect();
        metrics.sort_by_key(|metric| metric.timestamp);
        Ok(metrics)
    }

    async fn count_metrics_since(&self, since: DateTime<Utc>) -> StorageResult<u64> {
        let tables = self.tables.read().await;
        tables.ensure_open()?;

        Ok(tables
            .metrics
            .iter()
            .filter(|metric| metric.timestamp >= since)
            .count() as u64)
    }

    async fn cleanup_old_metrics(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        let mut tables = self.tables.write().await;
        tables.ensure_open()?;

        let initial = tables.metrics.len();
        tables.metrics.retain(|metric| metric.timestamp >= before);
        let deleted = initial - tables.metrics.len();
        debug!("in-memory backend: deleted {deleted} old metrics");
        Ok(deleted)
    }

    async fn insert_alert(&self, alert: AlertRow) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        tables.ensure_open()?;

        if tables.alerts.iter().any(|existing| existing.id == alert.id) {
            return Err(StorageError::QueryFailed(format!(
                "alert {} already exists",
                alert.id
            )));
        }
        tables.alerts.push(alert);
        Ok(())
    }

    async fn count_alerts_by_type_since(
        &self,
        kind: AlertKind,
        since: DateTime<Utc>,
    ) -> StorageResult<u64> {
        let tables = self.tables.read().await;
        tables.ensure_open()?;

        Ok(tables
            .alerts
            .iter()
            .filter(|alert| alert.kind == kind && alert.created_at >= since)
            .count() as u64)
    }

    async fn insert_backup_record(&self, record: &BackupRecord) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        tables.ensure_open()?;

        if tables.backups.iter().any(|existing| existing.id == record.id) {
            return Err(StorageError::QueryFailed(format!(
                "backup record {} already exists",
                record.id
            )));
        }
        tables.backups.push(record.clone());
        Ok(())
    }

    async fn backup_record(&self, id: &str) -> StorageResult<Option<BackupRecord>> {
        let tables = self.tables.read().await;
        tables.ensure_open()?;

        Ok(tables.backups.iter().find(|record| record.id == id).cloned())
    }

    async fn latest_successful_backup(&self) -> StorageResult<Option<BackupRecord>> {
        let tables = self.tables.read().await;
        tables.ensure_open()?;

        Ok(tables.latest_backup_where(|record| record.success))
    }

    async fn latest_full_backup(&self) -> StorageResult<Option<BackupRecord>> {
        let tables = self.tables.read().await;
        tables.ensure_open()?;

        Ok(tables
            .latest_backup_where(|record| record.success && record.backup_type == BackupType::Full))
    }

    async fn backup_history(&self, limit: usize) -> StorageResult<Vec<BackupRecord>> {
        let tables = self.tables.read().await;
        tables.ensure_open()?;

        let mut records = tables.backups.clone();
        records.sort_by_key(|record| record.started_at);
        let skip = records.len().saturating_sub(limit);
        Ok(records.into_iter().skip(skip).collect())
    }

    async fn successful_backups_older_than(
        &self,
        before: DateTime<Utc>,
    ) -> StorageResult<Vec<BackupRecord>> {
        let tables = self.tables.read().await;
        tables.ensure_open()?;

        let mut records: Vec<BackupRecord> = tables
            .backups
            .iter()
            .filter(|record| record.success && record.started_at < before)
            .cloned()
            .collect();
        records.sort_by_key(|record| record.started_at);
        Ok(records)
    }

    async fn delete_backup_records_older_than(
        &self,
        before: DateTime<Utc>,
    ) -> StorageResult<usize> {
        let mut tables = self.tables.write().await;
        tables.ensure_open()?;

        let initial = tables.backups.len();
        tables
            .backups
            .retain(|record| !(record.success && record.started_at < before));
        Ok(initial - tables.backups.len())
    }

    async fn insert_backup_feedback(&self, feedback: &BackupFeedback) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        tables.ensure_open()?;

        tables.feedback.push(feedback.clone());
        Ok(())
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let tables = self.tables.read().await;

        Ok(HealthStatus {
            healthy: !tables.closed,
            message: if tables.closed {
                "In-memory storage closed".to_string()
            } else {
                "In-memory storage operational".to_string()
            },
            metadata: HashMap::from([
                ("backend".to_string(), "memory".to_string()),
                ("total_metrics".to_string(), tables.metrics.len().to_string()),
            ]),
        })
    }

    async fn get_stats(&self) -> StorageResult<String> {
        let tables = self.tables.read().await;

        Ok(format!(
            "In-Memory: {} metrics, {} alerts, {} backups, {} feedback entries",
            tables.metrics.len(),
            tables.alerts.len(),
            tables.backups.len(),
            tables.feedback.len()
        ))
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory backend");
        self.tables.write().await.closed = true;
        Ok(())
    }
}
