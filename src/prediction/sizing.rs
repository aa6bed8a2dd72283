//! Backup classification and size estimation learned from backup history

use std::collections::HashMap;
use std::f64::consts::TAU;
use std::sync::RwLock;

use chrono::{DateTime, Datelike, Timelike, Utc};

use super::{ModelOutput, TrainOutcome, TrainingMetrics};
use crate::backup::{BackupRecord, BackupType};

const MIN_ESTIMATE_MB: f64 = 1.0;

/// Trainable model behind the backup strategy
pub trait BackupModel: Send + Sync {
    /// Backup type that historically ran at a similar time of week
    fn classify(&self, at: DateTime<Utc>) -> ModelOutput<BackupType>;

    fn estimate_size_mb(&self, backup_type: BackupType, days_since_last: f64)
    -> ModelOutput<f64>;

    /// Train on backup records. Failed attempts are ignored.
    fn train(&self, history: &[BackupRecord]) -> TrainOutcome;

    fn is_trained(&self) -> bool;
}

#[derive(Debug, Clone)]
struct SizingState {
    centroids: Vec<(BackupType, [f64; 4])>,
    /// Mean size and mean gap to the previous success, per type
    sizes: HashMap<BackupType, SizeStats>,
    overall_mb: f64,
}

#[derive(Debug, Clone, Copy)]
struct SizeStats {
    mean_mb: f64,
    mean_gap_days: f64,
}

/// Position in the week on two unit circles so that 23:00 sits next to 00:00
fn time_features(at: DateTime<Utc>) -> [f64; 4] {
    let hour = (at.hour() as f64 + at.minute() as f64 / 60.0) / 24.0 * TAU;
    let weekday = at.weekday().num_days_from_monday() as f64 / 7.0 * TAU;
    [hour.cos(), hour.sin(), weekday.cos(), weekday.sin()]
}

fn distance(a: &[f64; 4], b: &[f64; 4]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Nearest-centroid classifier on time of week plus per-type size averages
pub struct BaselineBackupModel {
    state: RwLock<Option<SizingState>>,
    min_samples: usize,
}

impl BaselineBackupModel {
    pub fn new(min_samples: usize) -> Self {
        Self {
            state: RwLock::new(None),
            min_samples: min_samples.max(1),
        }
    }
}

impl Default for BaselineBackupModel {
    fn default() -> Self {
        Self::new(5)
    }
}

impl BackupModel for BaselineBackupModel {
    fn classify(&self, at: DateTime<Utc>) -> ModelOutput<BackupType> {
        let guard = self
            .state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let Some(state) = guard.as_ref() else {
            return ModelOutput::NotTrained;
        };

        let point = time_features(at);
        state
            .centroids
            .iter()
            .min_by(|a, b| distance(&a.1, &point).total_cmp(&distance(&b.1, &point)))
            .map(|(backup_type, _)| ModelOutput::Ready(*backup_type))
            .unwrap_or(ModelOutput::NotTrained)
    }

    fn estimate_size_mb(
        &self,
        backup_type: BackupType,
        days_since_last: f64,
    ) -> ModelOutput<f64> {
        let guard = self
            .state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let Some(state) = guard.as_ref() else {
            return ModelOutput::NotTrained;
        };

        let estimate = match state.sizes.get(&backup_type) {
            // scale by how long changes have been accumulating compared to usual
            Some(stats) if stats.mean_gap_days > 0.0 && backup_type != BackupType::Full => {
                stats.mean_mb * (days_since_last / stats.mean_gap_days).max(1.0)
            }
            Some(stats) => stats.mean_mb,
            None => state.overall_mb,
        };

        ModelOutput::Ready(estimate.max(MIN_ESTIMATE_MB))
    }

    fn train(&self, history: &[BackupRecord]) -> TrainOutcome {
        let mut successful: Vec<&BackupRecord> =
            history.iter().filter(|record| record.success).collect();
        if successful.len() < self.min_samples {
            return TrainOutcome::InsufficientData {
                rows: successful.len(),
                required: self.min_samples,
            };
        }
        successful.sort_by_key(|record| record.started_at);

        if successful
            .iter()
            .any(|record| !record.size_mb.is_finite() || record.size_mb < 0.0)
        {
            return TrainOutcome::Failed("backup history contains invalid sizes".to_string());
        }

        let mut sums: HashMap<BackupType, ([f64; 4], f64, f64, usize)> = HashMap::new();
        let mut previous: Option<DateTime<Utc>> = None;
        for record in &successful {
            let gap_days = previous
                .map(|prev| (record.started_at - prev).num_seconds() as f64 / 86400.0)
                .unwrap_or(0.0);
            previous = Some(record.started_at);

            let entry = sums
                .entry(record.backup_type)
                .or_insert(([0.0; 4], 0.0, 0.0, 0));
            for (acc, value) in entry.0.iter_mut().zip(time_features(record.started_at)) {
                *acc += value;
            }
            entry.1 += record.size_mb;
            entry.2 += gap_days;
            entry.3 += 1;
        }

        let mut centroids = Vec::with_capacity(sums.len());
        let mut sizes = HashMap::with_capacity(sums.len());
        for (backup_type, (position, size, gap, count)) in sums {
            let n = count as f64;
            centroids.push((backup_type, position.map(|v| v / n)));
            sizes.insert(
                backup_type,
                SizeStats {
                    mean_mb: size / n,
                    mean_gap_days: gap / n,
                },
            );
        }
        // deterministic tie-breaking between equidistant centroids
        centroids.sort_by_key(|(backup_type, _)| *backup_type);

        let total = successful.len() as f64;
        let overall_mb = successful.iter().map(|record| record.size_mb).sum::<f64>() / total;

        // fraction of records whose type the fitted centroids reproduce
        let state = SizingState {
            centroids,
            sizes,
            overall_mb,
        };
        let reproduced = successful
            .iter()
            .filter(|record| {
                let point = time_features(record.started_at);
                state
                    .centroids
                    .iter()
                    .min_by(|a, b| distance(&a.1, &point).total_cmp(&distance(&b.1, &point)))
                    .is_some_and(|(backup_type, _)| *backup_type == record.backup_type)
            })
            .count();

        *self
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(state);

        TrainOutcome::Trained(TrainingMetrics {
            samples: successful.len(),
            score: reproduced as f64 / total,
        })
    }

    fn is_trained(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }
}
