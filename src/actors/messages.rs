//! Message types for actor communication
//!
//! Every actor has an mpsc command channel. Requests that expect an answer
//! carry a oneshot sender, the same way for every actor.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::oneshot;

use crate::backup::BackupOutcome;
use crate::error::AcquisitionError;
use crate::prediction::TrainOutcome;
use crate::storage::StorageError;

/// Summary of one monitoring tick
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TickReport {
    pub collected_at: DateTime<Utc>,
    pub partial: bool,
    /// Candidate alerts raised by the evaluator and the predictor
    pub raised: usize,
    pub dispatched: usize,
    pub suppressed: usize,
    pub failure_probability: f64,
    pub metric_persisted: bool,
}

/// Result of one retraining pass
#[derive(Debug, Clone, PartialEq)]
pub enum RetrainReport {
    /// Not enough new metric rows arrived within the last day
    Skipped { new_rows: u64, required: u64 },
    Retrained {
        failure: TrainOutcome,
        sizing: TrainOutcome,
        metrics_removed: usize,
    },
}

#[derive(Debug)]
pub enum MonitorCommand {
    /// Run a tick now, outside the interval
    RunNow {
        respond_to: oneshot::Sender<Result<TickReport, AcquisitionError>>,
    },
}

#[derive(Debug)]
pub enum BackupCommand {
    /// Suggest a strategy and execute it now
    RunNow {
        respond_to: oneshot::Sender<Result<BackupOutcome, StorageError>>,
    },
}

#[derive(Debug)]
pub enum RetrainCommand {
    /// Check for new data and retrain now
    RunNow {
        respond_to: oneshot::Sender<Result<RetrainReport, StorageError>>,
    },
}
