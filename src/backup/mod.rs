//! Adaptive backups
//!
//! The [`strategy::BackupStrategyEngine`] picks what kind of backup to run from
//! history and the sizing model, and the [`executor::BackupExecutor`] carries
//! it out. Every executed attempt leaves exactly one [`BackupRecord`] behind.

pub mod executor;
pub mod space;
pub mod strategy;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use executor::{BackupExecutor, BackupOutcome};
pub use space::{DiskSpaceProbe, FixedSpaceProbe, SpaceProbe};
pub use strategy::{BackupStrategyEngine, FrequencyRecommendation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupType {
    Full,
    Incremental,
    Differential,
}

impl BackupType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupType::Full => "full",
            BackupType::Incremental => "incremental",
            BackupType::Differential => "differential",
        }
    }
}

impl fmt::Display for BackupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackupType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(BackupType::Full),
            "incremental" => Ok(BackupType::Incremental),
            "differential" => Ok(BackupType::Differential),
            other => Err(format!("unknown backup type {other:?}")),
        }
    }
}

/// One executed backup attempt, successful or not
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub backup_type: BackupType,
    pub targets: Vec<PathBuf>,
    pub size_mb: f64,
    pub success: bool,
    pub error: Option<String>,
    /// Final artifact, a directory or a zip archive
    pub path: Option<PathBuf>,
}

/// What the next backup should look like
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Strategy {
    pub backup_type: BackupType,
    pub compress: bool,
    pub estimated_size_mb: f64,
    /// Hour of day (0-23) that historically finished fastest
    pub suggested_hour: u32,
    pub confidence: f64,
    pub days_since_last_backup: f64,
}

/// Operator rating of a finished backup, both scores on a 1-5 scale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupFeedback {
    pub backup_id: String,
    pub utility: u8,
    pub performance: u8,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl BackupFeedback {
    /// Ratings this low mean the sizing model no longer matches reality
    pub fn is_negative(&self) -> bool {
        self.utility < 2 || self.performance < 2
    }
}
