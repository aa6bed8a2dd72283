use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::{BackupFeedback, BackupType, Strategy};
use crate::config::BackupConfig;
use crate::prediction::{BackupModel, ModelOutput, TrainOutcome};
use crate::storage::{StorageBackend, StorageResult};

/// Records considered for hour suggestions, frequency analysis and training
const HISTORY_LIMIT: usize = 1000;

const DEFAULT_HOUR: u32 = 2;
const TRAINED_CONFIDENCE: f64 = 0.85;
const UNTRAINED_CONFIDENCE: f64 = 0.6;

/// MB above which the recommended interval is doubled
const LARGE_BACKUP_MB: f64 = 1000.0;

/// Days assumed when no backup ever succeeded
const DEFAULT_DAYS_SINCE_LAST: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrequencyRecommendation {
    pub interval_hours: u32,
    pub justification: String,
    /// Only present when there was enough history to analyse
    pub current_average_hours: Option<f64>,
    pub average_size_mb: Option<f64>,
    pub successful_backups: usize,
}

fn fallback_size_mb(backup_type: BackupType, days_since_last: f64) -> f64 {
    let base = match backup_type {
        BackupType::Full => 100.0,
        BackupType::Incremental | BackupType::Differential => 20.0,
    };
    base * (1.0 + days_since_last * 0.1)
}

/// Decides what the next backup looks like
pub struct BackupStrategyEngine {
    storage: Arc<dyn StorageBackend>,
    model: Arc<dyn BackupModel>,
    config: BackupConfig,
}

impl BackupStrategyEngine {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        model: Arc<dyn BackupModel>,
        config: BackupConfig,
    ) -> Self {
        Self {
            storage,
            model,
            config,
        }
    }

    #[instrument(skip(self))]
    pub async fn suggest(&self, now: DateTime<Utc>) -> StorageResult<Strategy> {
        let last_success = self.storage.latest_successful_backup().await?;
        let days_since_last_backup = last_success
            .as_ref()
            .map(|record| (now - record.started_at).num_seconds() as f64 / 86_400.0)
            .unwrap_or(DEFAULT_DAYS_SINCE_LAST);

        let trained = self.model.is_trained();
        let confidence = if trained {
            TRAINED_CONFIDENCE
        } else {
            UNTRAINED_CONFIDENCE
        };

        let backup_type = if last_success.is_none() {
            debug!("no successful backup yet, forcing full");
            BackupType::Full
        } else if days_since_last_backup > self.config.max_full_interval_days as f64 {
            debug!("last success {days_since_last_backup:.1} days ago, forcing full");
            BackupType::Full
        } else if confidence < self.config.conservative_confidence {
            debug!("confidence {confidence} below floor, preferring full");
            BackupType::Full
        } else {
            match self.model.classify(now) {
                ModelOutput::Ready(backup_type) => backup_type,
                ModelOutput::NotTrained if now.weekday() == self.config.anchor_weekday => {
                    BackupType::Full
                }
                ModelOutput::NotTrained => BackupType::Incremental,
            }
        };

        let estimated_size_mb = match self
            .model
            .estimate_size_mb(backup_type, days_since_last_backup)
        {
            ModelOutput::Ready(estimate) => estimate,
            ModelOutput::NotTrained => fallback_size_mb(backup_type, days_since_last_backup),
        };

        let strategy = Strategy {
            backup_type,
            compress: self.config.compress,
            estimated_size_mb,
            suggested_hour: self.suggested_hour().await?,
            confidence,
            days_since_last_backup,
        };

        info!(
            "suggested {} backup ({:.0}MB estimated)",
            strategy.backup_type, strategy.estimated_size_mb
        );
        Ok(strategy)
    }

    /// Hour of day whose successful backups finished fastest on average
    async fn suggested_hour(&self) -> StorageResult<u32> {
        let history = self.storage.backup_history(HISTORY_LIMIT).await?;

        let mut by_hour: BTreeMap<u32, (f64, usize)> = BTreeMap::new();
        for record in history.iter().filter(|record| record.success) {
            let entry = by_hour.entry(record.started_at.hour()).or_default();
            entry.0 += record.duration_secs;
            entry.1 += 1;
        }

        Ok(by_hour
            .into_iter()
            .map(|(hour, (total, count))| (hour, total / count as f64))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(hour, _)| hour)
            .unwrap_or(DEFAULT_HOUR))
    }

    /// Train the sizing model on the stored history
    #[instrument(skip(self))]
    pub async fn retrain(&self) -> StorageResult<TrainOutcome> {
        let history = self.storage.backup_history(HISTORY_LIMIT).await?;
        let outcome = self.model.train(&history);
        debug!("sizing model retrained: {outcome:?}");
        Ok(outcome)
    }

    /// Store operator feedback. Negative feedback retrains the sizing model in
    /// the background; the returned handle resolves once that is done.
    #[instrument(skip(self, feedback), fields(backup = feedback.backup_id))]
    pub async fn record_feedback(
        &self,
        feedback: &BackupFeedback,
    ) -> StorageResult<Option<JoinHandle<TrainOutcome>>> {
        self.storage.insert_backup_feedback(feedback).await?;
        info!(
            "recorded feedback for backup {} (utility {}, performance {})",
            feedback.backup_id, feedback.utility, feedback.performance
        );

        if !feedback.is_negative() {
            return Ok(None);
        }

        info!("negative feedback, retraining sizing model");
        let storage = self.storage.clone();
        let model = self.model.clone();
        Ok(Some(tokio::spawn(async move {
            match storage.backup_history(HISTORY_LIMIT).await {
                Ok(history) => model.train(&history),
                Err(e) => {
                    warn!("could not load backup history for retraining: {e}");
                    TrainOutcome::Failed(e.to_string())
                }
            }
        })))
    }

    #[instrument(skip(self))]
    pub async fn recommend_frequency(&self) -> StorageResult<FrequencyRecommendation> {
        let history = self.storage.backup_history(HISTORY_LIMIT).await?;
        let successful: Vec<_> = history.iter().filter(|record| record.success).collect();

        let (Some(first), Some(last)) = (
            successful.iter().map(|record| record.started_at).min(),
            successful.iter().map(|record| record.started_at).max(),
        ) else {
            return Ok(insufficient_data(successful.len()));
        };
        if successful.len() < 2 {
            return Ok(insufficient_data(successful.len()));
        }

        let count = successful.len();
        let span_days = (last - first).num_seconds() as f64 / 86_400.0;
        let average_hours = span_days * 24.0 / count as f64;
        let average_size_mb =
            successful.iter().map(|record| record.size_mb).sum::<f64>() / count as f64;

        let (mut interval_hours, mut justification) = if average_hours < 6.0 {
            (6, "backups are very frequent and consume space quickly".to_string())
        } else if average_hours < 12.0 {
            (12, "balanced frequency".to_string())
        } else if average_hours < 24.0 {
            (24, "daily backups are sufficient".to_string())
        } else {
            (48, "low change rate, frequency can be reduced".to_string())
        };

        if average_size_mb > LARGE_BACKUP_MB {
            interval_hours *= 2;
            justification.push_str(" (doubled because of the large data volume)");
        }

        Ok(FrequencyRecommendation {
            interval_hours,
            justification,
            current_average_hours: Some(average_hours),
            average_size_mb: Some(average_size_mb),
            successful_backups: count,
        })
    }
}

fn insufficient_data(successful_backups: usize) -> FrequencyRecommendation {
    FrequencyRecommendation {
        interval_hours: 12,
        justification: "insufficient data, using the default frequency".to_string(),
        current_average_hours: None,
        average_size_mb: None,
        successful_backups,
    }
}
