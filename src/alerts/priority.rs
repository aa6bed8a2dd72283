//! Advisory priority score and operator hints
//!
//! The score never gates delivery; it is attached to the dispatch report and
//! the persisted alert row so operators can sort by it.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::{error, instrument, trace};

use super::{Alert, AlertKind};
use crate::storage::StorageBackend;

pub const MAX_PRIORITY: u8 = 100;

const MAX_IMPACT: u8 = 25;

/// Breakdown of a priority score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PriorityScore {
    pub severity: u8,
    pub frequency: u8,
    pub impact: u8,
    pub recency: u8,
}

impl PriorityScore {
    pub fn total(&self) -> u8 {
        let sum = self.severity as u16 + self.frequency as u16 + self.impact as u16 + self.recency as u16;
        sum.min(MAX_PRIORITY as u16) as u8
    }
}

/// Weight of how often the kind fired within the last day
pub fn frequency_weight(occurrences: u64) -> u8 {
    match occurrences {
        n if n > 50 => 20,
        n if n > 20 => 15,
        n if n > 10 => 10,
        n if n > 5 => 5,
        n if n > 2 => 2,
        _ => 0,
    }
}

pub fn impact_weight(alert: &Alert) -> u8 {
    let mut impact = alert.kind().impact_base();

    if let Some((value, threshold)) = alert.details().value_and_threshold() {
        if value > threshold * 1.5 {
            impact += 10;
        } else if value > threshold * 1.2 {
            impact += 5;
        }
    }

    impact.min(MAX_IMPACT)
}

/// Alerts from the future are treated as brand new
pub fn recency_weight(age: TimeDelta) -> u8 {
    match age.num_seconds() {
        s if s < 5 * 60 => 15,
        s if s < 15 * 60 => 10,
        s if s < 30 * 60 => 5,
        s if s < 60 * 60 => 2,
        _ => 0,
    }
}

/// Score an alert given how often its kind fired within the last 24h
pub fn compute_priority(alert: &Alert, occurrences: u64, now: DateTime<Utc>) -> PriorityScore {
    PriorityScore {
        severity: alert.severity().weight(),
        frequency: frequency_weight(occurrences),
        impact: impact_weight(alert),
        recency: recency_weight(now - alert.created_at()),
    }
}

/// Scores alerts against the persisted alert history
pub struct PriorityEngine {
    storage: Arc<dyn StorageBackend>,
}

impl PriorityEngine {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    /// A failing store only costs the frequency component
    #[instrument(skip_all, fields(kind = %alert.kind()))]
    pub async fn score(&self, alert: &Alert, now: DateTime<Utc>) -> PriorityScore {
        let occurrences = match self
            .storage
            .count_alerts_by_type_since(alert.kind(), now - TimeDelta::hours(24))
            .await
        {
            Ok(count) => count,
            Err(e) => {
                error!("could not count recent {} alerts: {e}", alert.kind());
                0
            }
        };

        let score = compute_priority(alert, occurrences, now);
        trace!("priority {score:?} (total {})", score.total());
        score
    }
}

/// What an operator should look at first
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuggestedAction {
    pub action: &'static str,
    pub command: &'static str,
    pub remedy: &'static str,
}

pub fn suggest_action(alert: &Alert) -> SuggestedAction {
    match alert.kind() {
        AlertKind::CpuHigh => SuggestedAction {
            action: "Identify processes with high CPU usage",
            command: "ps aux --sort=-%cpu | head -10",
            remedy: "Add CPU capacity or optimise the offending processes",
        },
        AlertKind::MemoryHigh => SuggestedAction {
            action: "Check memory consumption per process",
            command: "ps aux --sort=-%mem | head -10",
            remedy: "Increase swap, add RAM or optimise applications",
        },
        AlertKind::DiskHigh => SuggestedAction {
            action: "Free disk space",
            command: "df -h; du -sh /* | sort -h",
            remedy: "Remove old logs, clear caches or grow the volume",
        },
        AlertKind::PredictedFailure => SuggestedAction {
            action: "Take preventive action",
            command: "systemctl status; journalctl -xe",
            remedy: "Restart degraded services, check logs and prepare failover",
        },
        AlertKind::BackupFailed => SuggestedAction {
            action: "Investigate the failed backup",
            command: "journalctl -xe | grep -i backup",
            remedy: "Check disk space, permissions and the backup destination",
        },
        AlertKind::ZombieProcesses => SuggestedAction {
            action: "Find the parents of zombie processes",
            command: "ps -eo pid,ppid,stat,cmd | awk '$3 ~ /Z/'",
            remedy: "Restart or fix the parent process that does not reap its children",
        },
        AlertKind::BackupSucceeded => SuggestedAction {
            action: "Investigate the alert",
            command: "journalctl -xe",
            remedy: "Review the system logs",
        },
    }
}
