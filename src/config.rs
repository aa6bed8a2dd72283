use std::path::PathBuf;
use std::time::Duration;

use chrono::Weekday;
use tracing::trace;

use crate::error::ConfigError;
use crate::util;

/// Storage backend configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database (default for most deployments)
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,

        /// Retention period in days for metric rows
        #[serde(default = "default_retention_days")]
        retention_days: u32,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
            retention_days: default_retention_days(),
        }
    }
}

impl StorageConfig {
    /// Days metric rows are kept, `None` when nothing is persisted
    pub fn retention_days(&self) -> Option<u32> {
        match self {
            StorageConfig::None => None,
            StorageConfig::Sqlite { retention_days, .. } => Some(*retention_days),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./hostwarden.db")
}

fn default_retention_days() -> u32 {
    30
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub monitoring: MonitoringConfig,

    #[serde(default)]
    pub alerts: AlertsConfig,

    #[serde(default)]
    pub backup: BackupConfig,

    #[serde(default)]
    pub retraining: RetrainingConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    /// Log level for the crate's own targets (error, warn, info, debug, trace)
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct MonitoringConfig {
    #[serde(default = "default_monitor_interval")]
    pub interval_secs: u64,

    /// Upper bound for a single collection
    #[serde(default = "default_collect_timeout")]
    pub collect_timeout_secs: u64,

    /// Pause after a failed tick before the loop resumes
    #[serde(default = "default_failure_backoff")]
    pub failure_backoff_secs: u64,

    #[serde(default)]
    pub thresholds: Thresholds,

    #[serde(default)]
    pub prediction: PredictionConfig,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_monitor_interval(),
            collect_timeout_secs: default_collect_timeout(),
            failure_backoff_secs: default_failure_backoff(),
            thresholds: Thresholds::default(),
            prediction: PredictionConfig::default(),
        }
    }
}

fn default_monitor_interval() -> u64 {
    60
}

fn default_collect_timeout() -> u64 {
    10
}

fn default_failure_backoff() -> u64 {
    5
}

/// Percentages above which a resource alert is raised
#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize)]
pub struct Thresholds {
    #[serde(default = "default_cpu_threshold")]
    pub cpu: f64,
    #[serde(default = "default_memory_threshold")]
    pub memory: f64,
    #[serde(default = "default_disk_threshold")]
    pub disk: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            cpu: default_cpu_threshold(),
            memory: default_memory_threshold(),
            disk: default_disk_threshold(),
        }
    }
}

fn default_cpu_threshold() -> f64 {
    80.0
}

fn default_memory_threshold() -> f64 {
    85.0
}

fn default_disk_threshold() -> f64 {
    90.0
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct PredictionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Failure probability above which a predicted_failure alert is raised
    #[serde(default = "default_prediction_threshold")]
    pub threshold: f64,

    /// Samples required before the failure model is considered trained
    #[serde(default = "default_min_training_rows")]
    pub min_training_rows: usize,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: default_prediction_threshold(),
            min_training_rows: default_min_training_rows(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_prediction_threshold() -> f64 {
    0.7
}

fn default_min_training_rows() -> usize {
    50
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct AlertsConfig {
    /// Window multiplier applied after a failed delivery
    #[serde(default = "default_widen_factor")]
    pub widen_factor: f64,

    /// Window multiplier applied after a successful delivery
    #[serde(default = "default_decay_factor")]
    pub decay_factor: f64,

    #[serde(default)]
    pub email: EmailConfig,

    #[serde(default)]
    pub telegram: TelegramConfig,

    #[serde(default)]
    pub webhook: WebhookConfig,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            widen_factor: default_widen_factor(),
            decay_factor: default_decay_factor(),
            email: EmailConfig::default(),
            telegram: TelegramConfig::default(),
            webhook: WebhookConfig::default(),
        }
    }
}

fn default_widen_factor() -> f64 {
    1.5
}

fn default_decay_factor() -> f64 {
    0.9
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub enabled: bool,
    pub smtp_host: Option<String>,
    #[serde(default = "crate::util::get_default_smtp_port")]
    pub smtp_port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: Option<String>,
    #[serde(default)]
    pub to: Vec<String>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: None,
            smtp_port: util::get_default_smtp_port(),
            username: None,
            password: None,
            from: None,
            to: vec![],
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    #[serde(default = "default_telegram_api")]
    pub api_base: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bot_token: None,
            chat_id: None,
            api_base: default_telegram_api(),
        }
    }
}

fn default_telegram_api() -> String {
    String::from("https://api.telegram.org")
}

/// Payload flavour for the generic webhook channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookFormat {
    #[default]
    Generic,
    Slack,
    Discord,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct WebhookConfig {
    #[serde(default)]
    pub enabled: bool,
    pub url: Option<String>,
    #[serde(default)]
    pub format: WebhookFormat,
    /// Discord user to mention in the message content
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct BackupConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_backup_interval")]
    pub interval_secs: u64,

    /// Roots that a full backup copies
    #[serde(default)]
    pub sources: Vec<PathBuf>,

    #[serde(default = "default_backup_destination")]
    pub destination: PathBuf,

    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    #[serde(default = "default_true")]
    pub compress: bool,

    /// Weekday on which the untrained fallback prefers a full backup
    #[serde(default = "default_anchor_weekday")]
    pub anchor_weekday: Weekday,

    /// A full backup is forced when the last success is older than this
    #[serde(default = "default_max_full_interval_days")]
    pub max_full_interval_days: i64,

    /// Strategies below this confidence fall back to a full backup
    #[serde(default = "default_conservative_confidence")]
    pub conservative_confidence: f64,

    #[serde(default = "default_failure_backoff")]
    pub failure_backoff_secs: u64,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_backup_interval(),
            sources: vec![],
            destination: default_backup_destination(),
            retention_days: default_retention_days(),
            compress: true,
            anchor_weekday: default_anchor_weekday(),
            max_full_interval_days: default_max_full_interval_days(),
            conservative_confidence: default_conservative_confidence(),
            failure_backoff_secs: default_failure_backoff(),
        }
    }
}

fn default_backup_interval() -> u64 {
    3600
}

fn default_backup_destination() -> PathBuf {
    PathBuf::from("./backups")
}

fn default_anchor_weekday() -> Weekday {
    Weekday::Mon
}

fn default_max_full_interval_days() -> i64 {
    7
}

fn default_conservative_confidence() -> f64 {
    0.5
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct RetrainingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_retrain_interval")]
    pub interval_secs: u64,

    /// Metric rows that must have arrived within the last day
    #[serde(default = "default_min_new_rows")]
    pub min_new_rows: u64,

    #[serde(default = "default_failure_backoff")]
    pub failure_backoff_secs: u64,
}

impl Default for RetrainingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_retrain_interval(),
            min_new_rows: default_min_new_rows(),
            failure_backoff_secs: default_failure_backoff(),
        }
    }
}

fn default_retrain_interval() -> u64 {
    86400
}

fn default_min_new_rows() -> u64 {
    100
}

impl MonitoringConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn collect_timeout(&self) -> Duration {
        Duration::from_secs(self.collect_timeout_secs)
    }

    pub fn failure_backoff(&self) -> Duration {
        Duration::from_secs(self.failure_backoff_secs)
    }
}

impl BackupConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn failure_backoff(&self) -> Duration {
        Duration::from_secs(self.failure_backoff_secs)
    }
}

impl RetrainingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn failure_backoff(&self) -> Duration {
        Duration::from_secs(self.failure_backoff_secs)
    }
}

impl Config {
    /// Fill credentials from the environment. Values found there win over the file.
    pub fn apply_env(&mut self) {
        let email = &mut self.alerts.email;
        email.smtp_host = util::get_smtp_host().or(email.smtp_host.take());
        if let Some(port) = util::get_smtp_port() {
            email.smtp_port = port;
        }
        email.username = util::get_smtp_user().or(email.username.take());
        email.password = util::get_smtp_password().or(email.password.take());
        email.from = util::get_email_from().or(email.from.take());
        if let Some(to) = util::get_email_to() {
            email.to = to;
        }

        let telegram = &mut self.alerts.telegram;
        telegram.bot_token = util::get_telegram_bot_token().or(telegram.bot_token.take());
        telegram.chat_id = util::get_telegram_chat_id().or(telegram.chat_id.take());

        let webhook = &mut self.alerts.webhook;
        webhook.url = util::get_webhook_url().or(webhook.url.take());
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("monitoring.interval_secs", self.monitoring.interval_secs),
            ("monitoring.collect_timeout_secs", self.monitoring.collect_timeout_secs),
            ("backup.interval_secs", self.backup.interval_secs),
            ("retraining.interval_secs", self.retraining.interval_secs),
            ("backup.retention_days", u64::from(self.backup.retention_days)),
            (
                "storage.retention_days",
                u64::from(self.storage.retention_days().unwrap_or(1)),
            ),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        let thresholds = self.monitoring.thresholds;
        let percentages = [
            ("monitoring.thresholds.cpu", thresholds.cpu),
            ("monitoring.thresholds.memory", thresholds.memory),
            ("monitoring.thresholds.disk", thresholds.disk),
        ];
        for (field, value) in percentages {
            if !(0.0..=100.0).contains(&value) {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("{value} is not a percentage"),
                });
            }
        }

        let probability = self.monitoring.prediction.threshold;
        if !(0.0..=1.0).contains(&probability) {
            return Err(ConfigError::Invalid {
                field: "monitoring.prediction.threshold",
                reason: format!("{probability} is not a probability"),
            });
        }

        if !(0.0..=1.0).contains(&self.backup.conservative_confidence) {
            return Err(ConfigError::Invalid {
                field: "backup.conservative_confidence",
                reason: format!("{} is not in [0, 1]", self.backup.conservative_confidence),
            });
        }

        if self.alerts.widen_factor < 1.0 {
            return Err(ConfigError::Invalid {
                field: "alerts.widen_factor",
                reason: "must be at least 1.0".to_string(),
            });
        }

        if !(0.0..=1.0).contains(&self.alerts.decay_factor) || self.alerts.decay_factor == 0.0 {
            return Err(ConfigError::Invalid {
                field: "alerts.decay_factor",
                reason: "must be in (0, 1]".to_string(),
            });
        }

        Ok(())
    }
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();

        assert_eq!(config.monitoring.interval_secs, 60);
        assert_eq!(config.monitoring.thresholds, Thresholds::default());
        assert_eq!(config.monitoring.prediction.threshold, 0.7);
        assert_eq!(config.backup.interval_secs, 3600);
        assert_eq!(config.backup.retention_days, 30);
        assert_eq!(config.backup.anchor_weekday, Weekday::Mon);
        assert_eq!(config.retraining.interval_secs, 86400);
        assert_eq!(config.retraining.min_new_rows, 100);
        assert_eq!(config.alerts.decay_factor, 0.9);
        assert!(!config.alerts.email.enabled);
        assert!(matches!(config.storage, StorageConfig::Sqlite { .. }));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config: Config = serde_json::from_str(
            r#"{
                "monitoring": { "thresholds": { "cpu": 70 } },
                "backup": { "sources": ["/etc"], "anchor_weekday": "Sun", "compress": false },
                "alerts": { "webhook": { "enabled": true, "url": "http://localhost/hook", "format": "slack" } },
                "storage": { "backend": "none" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.monitoring.thresholds.cpu, 70.0);
        assert_eq!(config.monitoring.thresholds.memory, 85.0);
        assert_eq!(config.backup.sources, vec![PathBuf::from("/etc")]);
        assert_eq!(config.backup.anchor_weekday, Weekday::Sun);
        assert!(!config.backup.compress);
        assert_eq!(config.alerts.webhook.format, WebhookFormat::Slack);
        assert!(matches!(config.storage, StorageConfig::None));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = Config::default();
        config.monitoring.interval_secs = 0;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("monitoring.interval_secs"));
    }

    #[test]
    fn test_validate_rejects_zero_retention() {
        let mut config = Config::default();
        config.backup.retention_days = 0;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("backup.retention_days"));
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let mut config = Config::default();
        config.monitoring.thresholds.disk = 120.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.monitoring.prediction.threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_read_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "monitoring": { "interval_secs": 15 } }"#).unwrap();

        let config = read_config_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.monitoring.interval_secs, 15);
    }

    #[test]
    fn test_read_config_file_rejects_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(read_config_file(path.to_str().unwrap()).is_err());
    }
}
