//! SQLite storage backend implementation
//!
//! This module provides a SQLite-based implementation of the `StorageBackend` trait.
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Reads from the monitoring loop never wait on a backup write
//! - **Connection pooling**: One pool shared by every activity
//! - **Migrations**: Automatic schema versioning with sqlx

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use super::backend::{HealthStatus, StorageBackend};
use super::error::{StorageError, StorageResult};
use super::schema::{AlertRow, MetricRow};
use crate::Snapshot;
use crate::alerts::AlertKind;
use crate::backup::{BackupFeedback, BackupRecord, BackupType};

const BACKUP_COLUMNS: &str =
    "id, started_at, duration_secs, backup_type, targets, size_mb, success, error, path";

/// SQLite storage backend
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteBackend {
    /// Create a new SQLite backend
    ///
    /// This will:
    /// 1. Create the database file if it doesn't exist
    /// 2. Run migrations to create tables
    /// 3. Configure SQLite for concurrent readers (WAL mode, etc.)
    ///
    /// ## Example
    ///
    /// ```no_run
    /// # use hostwarden::storage::sqlite::SqliteBackend;
    /// # async fn example() -> anyhow::Result<()> {
    /// let backend = SqliteBackend::new("./hostwarden.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite backend at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("database migrations complete");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    /// Helper to convert timestamp to Unix milliseconds for SQLite
    fn timestamp_to_millis(dt: &DateTime<Utc>) -> i64 {
        dt.timestamp_millis()
    }

    /// Helper to convert Unix milliseconds from SQLite to DateTime
    fn millis_to_timestamp(millis: i64) -> StorageResult<DateTime<Utc>> {
        DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| StorageError::CorruptRow(format!("timestamp {millis} out of range")))
    }

    fn metric_from_row(row: &SqliteRow) -> StorageResult<MetricRow> {
        let snapshot_json: String = row.get("snapshot");
        let snapshot: Snapshot = serde_json::from_str(&snapshot_json)?;

        Ok(MetricRow {
            timestamp: Self::millis_to_timestamp(row.get("timestamp"))?,
            cpu_percent: row.get("cpu_percent"),
            memory_percent: row.get("memory_percent"),
            disk_percent: row.get("disk_percent"),
            load_one: row.get("load_one"),
            process_count: row.get::<i64, _>("process_count") as u64,
            zombie_count: row.get::<i64, _>("zombie_count") as u64,
            snapshot,
        })
    }

    fn backup_from_row(row: &SqliteRow) -> StorageResult<BackupRecord> {
        let backup_type: String = row.get("backup_type");
        let backup_type: BackupType = backup_type.parse().map_err(StorageError::CorruptRow)?;
        let targets_json: String = row.get("targets");
        let targets: Vec<PathBuf> = serde_json::from_str(&targets_json)?;

        Ok(BackupRecord {
            id: row.get("id"),
            started_at: Self::millis_to_timestamp(row.get("started_at"))?,
            duration_secs: row.get("duration_secs"),
            backup_type,
            targets,
            size_mb: row.get("size_mb"),
            success: row.get("success"),
            error: row.get("error"),
            path: row.get::<Option<String>, _>("path").map(PathBuf::from),
        })
    }

    async fn fetch_backups(&self, sql: &str, bind: Option<i64>) -> StorageResult<Vec<BackupRecord>> {
        let mut query = sqlx::query(sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(Self::backup_from_row).collect()
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    #[instrument(skip(self, metric), fields(timestamp = %metric.timestamp))]
    async fn insert_metric(&self, metric: MetricRow) -> StorageResult<()> {
        let snapshot_json = serde_json::to_string(&metric.snapshot)?;

        sqlx::query(
            r#"
            INSERT INTO metrics (
                timestamp, cpu_percent, memory_percent, disk_percent,
                load_one, process_count, zombie_count, snapshot
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Self::timestamp_to_millis(&metric.timestamp))
        .bind(metric.cpu_percent)
        .bind(metric.memory_percent)
        .bind(metric.disk_percent)
        .bind(metric.load_one)
        .bind(metric.process_count as i64)
        .bind(metric.zombie_count as i64)
        .bind(snapshot_json)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn metrics_since(&self, since: DateTime<Utc>) -> StorageResult<Vec<MetricRow>> {
        let rows = sqlx::query(
            r#"
            SELECT timestamp, cpu_percent, memory_percent, disk_percent,
                   load_one, process_count, zombie_count, snapshot
            FROM metrics
            WHERE timestamp >= ?
            ORDER BY timestamp ASC
            "#,
        )
        .bind(Self::timestamp_to_millis(&since))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        let metrics: StorageResult<Vec<MetricRow>> = rows.iter().map(Self::metric_from_row).collect();
        let results = metrics?;
        debug!("query returned {} metrics", results.len());
        Ok(results)
    }

    async fn count_metrics_since(&self, since: DateTime<Utc>) -> StorageResult<u64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM metrics WHERE timestamp >= ?")
            .bind(Self::timestamp_to_millis(&since))
            .fetch_one(&self.pool)
            .await?;

        Ok(row.0 as u64)
    }

    #[instrument(skip(self), fields(before = %before))]
    async fn cleanup_old_metrics(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        info!("cleaning up metrics older than {}", before);

        let result = sqlx::query("DELETE FROM metrics WHERE timestamp < ?")
            .bind(Self::timestamp_to_millis(&before))
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        let deleted = result.rows_affected() as usize;
        info!("deleted {} old metrics", deleted);

        Ok(deleted)
    }

    #[instrument(skip(self, alert), fields(id = %alert.id, kind = %alert.kind))]
    async fn insert_alert(&self, alert: AlertRow) -> StorageResult<()> {
        let details_json = serde_json::to_string(&alert.details)?;
        let deliveries_json = serde_json::to_string(&alert.deliveries)?;

        sqlx::query(
            r#"
            INSERT INTO alerts (
                id, kind, severity, message, details, priority, deliveries, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&alert.id)
        .bind(alert.kind.as_str())
        .bind(alert.severity.as_str())
        .bind(&alert.message)
        .bind(details_json)
        .bind(alert.priority as i64)
        .bind(deliveries_json)
        .bind(Self::timestamp_to_millis(&alert.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn count_alerts_by_type_since(
        &self,
        kind: AlertKind,
        since: DateTime<Utc>,
    ) -> StorageResult<u64> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM alerts WHERE kind = ? AND created_at >= ?")
                .bind(kind.as_str())
                .bind(Self::timestamp_to_millis(&since))
                .fetch_one(&self.pool)
                .await?;

        Ok(row.0 as u64)
    }

    #[instrument(skip(self, record), fields(id = %record.id, success = record.success))]
    async fn insert_backup_record(&self, record: &BackupRecord) -> StorageResult<()> {
        let targets_json = serde_json::to_string(&record.targets)?;

        sqlx::query(
            r#"
            INSERT INTO backups (
                id, started_at, duration_secs, backup_type, targets,
                size_mb, success, error, path
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(Self::timestamp_to_millis(&record.started_at))
        .bind(record.duration_secs)
        .bind(record.backup_type.as_str())
        .bind(targets_json)
        .bind(record.size_mb)
        .bind(record.success)
        .bind(&record.error)
        .bind(
            record
                .path
                .as_ref()
                .map(|path| path.to_string_lossy().to_string()),
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn backup_record(&self, id: &str) -> StorageResult<Option<BackupRecord>> {
        let row = sqlx::query(&format!("SELECT {BACKUP_COLUMNS} FROM backups WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::backup_from_row).transpose()
    }

    async fn latest_successful_backup(&self) -> StorageResult<Option<BackupRecord>> {
        let sql = format!(
            "SELECT {BACKUP_COLUMNS} FROM backups WHERE success = 1 ORDER BY started_at DESC LIMIT 1"
        );
        Ok(self.fetch_backups(&sql, None).await?.into_iter().next())
    }

    async fn latest_full_backup(&self) -> StorageResult<Option<BackupRecord>> {
        let sql = format!(
            "SELECT {BACKUP_COLUMNS} FROM backups \
             WHERE success = 1 AND backup_type = 'full' ORDER BY started_at DESC LIMIT 1"
        );
        Ok(self.fetch_backups(&sql, None).await?.into_iter().next())
    }

    async fn backup_history(&self, limit: usize) -> StorageResult<Vec<BackupRecord>> {
        let sql = format!("SELECT {BACKUP_COLUMNS} FROM backups ORDER BY started_at DESC LIMIT ?");
        let mut records = self.fetch_backups(&sql, Some(limit as i64)).await?;
        // Reverse to get chronological order (oldest first)
        records.reverse();
        Ok(records)
    }

    async fn successful_backups_older_than(
        &self,
        before: DateTime<Utc>,
    ) -> StorageResult<Vec<BackupRecord>> {
        let sql = format!(
            "SELECT {BACKUP_COLUMNS} FROM backups \
             WHERE success = 1 AND started_at < ? ORDER BY started_at ASC"
        );
        self.fetch_backups(&sql, Some(Self::timestamp_to_millis(&before)))
            .await
    }

    #[instrument(skip(self), fields(before = %before))]
    async fn delete_backup_records_older_than(
        &self,
        before: DateTime<Utc>,
    ) -> StorageResult<usize> {
        let result = sqlx::query("DELETE FROM backups WHERE success = 1 AND started_at < ?")
            .bind(Self::timestamp_to_millis(&before))
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() as usize;
        debug!("deleted {} expired backup records", deleted);
        Ok(deleted)
    }

    async fn insert_backup_feedback(&self, feedback: &BackupFeedback) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO backup_feedback (backup_id, utility, performance, comment, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&feedback.backup_id)
        .bind(feedback.utility as i64)
        .bind(feedback.performance as i64)
        .bind(&feedback.comment)
        .bind(Self::timestamp_to_millis(&feedback.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        // Simple ping query to verify connection
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => {
                let mut metadata = HashMap::new();
                metadata.insert("backend".to_string(), "sqlite".to_string());
                metadata.insert("db_path".to_string(), self.db_path.clone());

                Ok(HealthStatus {
                    healthy: true,
                    message: "SQLite backend operational".to_string(),
                    metadata,
                })
            }
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                    metadata: HashMap::new(),
                })
            }
        }
    }

    #[instrument(skip(self))]
    async fn get_stats(&self) -> StorageResult<String> {
        let (metrics,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM metrics")
            .fetch_one(&self.pool)
            .await?;
        let (alerts,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM alerts")
            .fetch_one(&self.pool)
            .await?;
        let (backups,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM backups")
            .fetch_one(&self.pool)
            .await?;

        let file_size = std::fs::metadata(&self.db_path)
            .map(|m| m.len())
            .unwrap_or(0);

        let file_size_mb = file_size as f64 / 1_000_000.0;

        Ok(format!(
            "SQLite: {} metrics, {} alerts, {} backups, {:.2} MB on disk",
            metrics, alerts, backups, file_size_mb
        ))
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite backend");
        self.pool.close().await;
        Ok(())
    }
}
