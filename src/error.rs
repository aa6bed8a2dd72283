//! Error types shared across the engine
//!
//! Only startup failures are fatal. Every other error here is handled at the
//! boundary of the activity that produced it: a tick is skipped, a channel is
//! marked failed, or a backup attempt is recorded as failed.

use std::time::Duration;

use thiserror::Error;

use crate::storage::StorageError;

/// Invalid or incomplete configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("channel {channel} is enabled but {missing} is not set")]
    MissingCredential {
        channel: &'static str,
        missing: &'static str,
    },

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// The metrics source could not produce a snapshot
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("metrics collection timed out after {0:?}")]
    Timeout(Duration),

    #[error("metrics collection task failed: {0}")]
    Task(String),
}

/// A single channel failed to deliver an alert
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remote endpoint answered with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid email address {address}: {reason}")]
    Address { address: String, reason: String },

    #[error("smtp delivery failed: {0}")]
    Smtp(String),

    #[error("channel is not configured")]
    Inactive,
}

/// A backup attempt could not be completed
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("insufficient disk space: {required_mb:.2}MB required, {available_mb:.2}MB available")]
    Space { required_mb: f64, available_mb: f64 },

    #[error("backup i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive operation failed: {0}")]
    Archive(String),

    #[error("backup bookkeeping failed: {0}")]
    Persistence(#[from] StorageError),

    #[error("backup {0} not found")]
    NotFound(String),

    #[error("backup worker failed: {0}")]
    Task(String),
}

impl From<zip::result::ZipError> for BackupError {
    fn from(err: zip::result::ZipError) -> Self {
        BackupError::Archive(err.to_string())
    }
}

impl From<tokio::task::JoinError> for BackupError {
    fn from(err: tokio::task::JoinError) -> Self {
        BackupError::Task(err.to_string())
    }
}
