//! Alert model and the admission pipeline
//!
//! An [`Alert`] is built once by an evaluator and never changes afterwards,
//! except that the dispatcher appends one [`DeliveryResult`] per attempted
//! channel. The severity chosen at creation decides both the base cooldown
//! window and the set of channels the alert is routed to.

pub mod cooldown;
pub mod dispatcher;
pub mod pipeline;
pub mod priority;

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::backup::BackupType;
use crate::prediction::{FeatureContribution, RiskLevel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    /// Case-insensitive parse. Unknown values fall back to `Medium`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "critical" => Severity::Critical,
            "high" => Severity::High,
            "medium" => Severity::Medium,
            "low" => Severity::Low,
            "info" => Severity::Info,
            other => {
                debug!("unknown severity {other:?}, treating as medium");
                Severity::Medium
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }

    /// Contribution of the severity to the priority score
    pub fn weight(&self) -> u8 {
        match self {
            Severity::Critical => 40,
            Severity::High => 30,
            Severity::Medium => 20,
            Severity::Low => 10,
            Severity::Info => 5,
        }
    }

    /// Smallest suppression window for alerts of this severity
    pub fn base_cooldown(&self) -> Duration {
        let secs = match self {
            Severity::Critical => 60,
            Severity::High => 300,
            Severity::Medium => 1800,
            Severity::Low => 3600,
            Severity::Info => 43200,
        };
        Duration::from_secs(secs)
    }

    /// Channels an admitted alert of this severity is routed to.
    /// Info alerts are only logged.
    pub fn channels(&self) -> &'static [Channel] {
        match self {
            Severity::Critical => &[Channel::Telegram, Channel::Email, Channel::Webhook],
            Severity::High => &[Channel::Telegram, Channel::Email],
            Severity::Medium | Severity::Low => &[Channel::Email],
            Severity::Info => &[],
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Severity {
    fn from(value: &str) -> Self {
        Severity::parse(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Telegram,
    Webhook,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Telegram => "telegram",
            Channel::Webhook => "webhook",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    CpuHigh,
    MemoryHigh,
    DiskHigh,
    ZombieProcesses,
    PredictedFailure,
    BackupSucceeded,
    BackupFailed,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::CpuHigh => "cpu_high",
            AlertKind::MemoryHigh => "memory_high",
            AlertKind::DiskHigh => "disk_high",
            AlertKind::ZombieProcesses => "zombie_processes",
            AlertKind::PredictedFailure => "predicted_failure",
            AlertKind::BackupSucceeded => "backup_succeeded",
            AlertKind::BackupFailed => "backup_failed",
        }
    }

    /// Base impact used by the priority score
    pub fn impact_base(&self) -> u8 {
        match self {
            AlertKind::CpuHigh | AlertKind::MemoryHigh => 15,
            AlertKind::DiskHigh => 20,
            AlertKind::PredictedFailure => 25,
            AlertKind::BackupFailed => 10,
            AlertKind::ZombieProcesses | AlertKind::BackupSucceeded => 5,
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed payload of an alert, one variant per alert kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertDetails {
    CpuHigh {
        value: f64,
        threshold: f64,
    },
    MemoryHigh {
        value: f64,
        threshold: f64,
    },
    DiskHigh {
        value: f64,
        threshold: f64,
    },
    ZombieProcesses {
        count: usize,
    },
    PredictedFailure {
        probability: f64,
        risk: RiskLevel,
        top_features: Vec<FeatureContribution>,
    },
    BackupSucceeded {
        backup_id: String,
        backup_type: BackupType,
        size_mb: f64,
        duration_secs: f64,
    },
    BackupFailed {
        backup_id: Option<String>,
        backup_type: Option<BackupType>,
        error: String,
    },
}

impl AlertDetails {
    pub fn kind(&self) -> AlertKind {
        match self {
            AlertDetails::CpuHigh { .. } => AlertKind::CpuHigh,
            AlertDetails::MemoryHigh { .. } => AlertKind::MemoryHigh,
            AlertDetails::DiskHigh { .. } => AlertKind::DiskHigh,
            AlertDetails::ZombieProcesses { .. } => AlertKind::ZombieProcesses,
            AlertDetails::PredictedFailure { .. } => AlertKind::PredictedFailure,
            AlertDetails::BackupSucceeded { .. } => AlertKind::BackupSucceeded,
            AlertDetails::BackupFailed { .. } => AlertKind::BackupFailed,
        }
    }

    /// Measured value and the threshold it was compared against, for threshold alerts
    pub fn value_and_threshold(&self) -> Option<(f64, f64)> {
        match self {
            AlertDetails::CpuHigh { value, threshold }
            | AlertDetails::MemoryHigh { value, threshold }
            | AlertDetails::DiskHigh { value, threshold } => Some((*value, *threshold)),
            _ => None,
        }
    }
}

/// Outcome of one delivery attempt on one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub channel: Channel,
    pub success: bool,
    pub attempted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    id: String,
    kind: AlertKind,
    severity: Severity,
    message: String,
    details: AlertDetails,
    created_at: DateTime<Utc>,
    deliveries: Vec<DeliveryResult>,
}

impl Alert {
    pub fn new(
        severity: Severity,
        message: impl Into<String>,
        details: AlertDetails,
        created_at: DateTime<Utc>,
    ) -> Self {
        let message = message.into();
        let kind = details.kind();
        let id = alert_id(kind, created_at, &message);

        Self {
            id,
            kind,
            severity,
            message,
            details,
            created_at,
            deliveries: vec![],
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> AlertKind {
        self.kind
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> &AlertDetails {
        &self.details
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn deliveries(&self) -> &[DeliveryResult] {
        &self.deliveries
    }

    /// The only mutation an alert accepts after creation
    pub fn record_delivery(&mut self, result: DeliveryResult) {
        self.deliveries.push(result);
    }

    pub fn any_delivery_failed(&self) -> bool {
        self.deliveries.iter().any(|delivery| !delivery.success)
    }
}

/// `alert_<timestamp>_<16 hex digits>`, stable across builds
fn alert_id(kind: AlertKind, created_at: DateTime<Utc>, message: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_str().as_bytes());
    hasher.update(created_at.timestamp_millis().to_be_bytes());
    hasher.update(message.as_bytes());
    let digest = hasher.finalize();

    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);

    format!(
        "alert_{}_{:016x}",
        created_at.format("%Y%m%d%H%M%S"),
        u64::from_be_bytes(prefix)
    )
}
