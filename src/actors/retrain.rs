//! RetrainActor - Periodically refreshes the models
//!
//! The failure model trains on the last week of snapshots, the sizing model
//! on the backup history. Retraining is skipped while fewer than
//! `min_new_rows` snapshots arrived within the last day. Each pass also
//! sweeps metric rows that left the storage retention window.

use anyhow::{Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tracing::{debug, error, info, instrument, warn};

use super::messages::{RetrainCommand, RetrainReport};
use crate::config::RetrainingConfig;
use crate::orchestrator::{Components, ShutdownSignal, TRAINING_WINDOW_DAYS};
use crate::prediction::TrainOutcome;
use crate::storage::StorageError;

pub struct RetrainActor {
    components: Components,
    config: RetrainingConfig,
    retention_days: Option<u32>,
    command_rx: mpsc::Receiver<RetrainCommand>,
    shutdown: ShutdownSignal,
}

impl RetrainActor {
    pub fn new(
        components: Components,
        config: RetrainingConfig,
        retention_days: Option<u32>,
        command_rx: mpsc::Receiver<RetrainCommand>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            components,
            config,
            retention_days,
            command_rx,
            shutdown,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting retrain actor");

        let period = self.config.interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        let shutdown = self.shutdown.clone();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("received shutdown signal");
                    break;
                }

                _ = ticker.tick() => {
                    tokio::select! {
                        result = self.retrain(Utc::now()) => {
                            if let Err(e) = result {
                                self.on_failure(&e).await;
                            }
                        }
                        _ = shutdown.cancelled() => break,
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        RetrainCommand::RunNow { respond_to } => {
                            debug!("received RunNow command");
                            let result = self.retrain(Utc::now()).await;
                            if let Err(e) = &result {
                                self.on_failure(e).await;
                            }
                            let _ = respond_to.send(result);
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("retrain actor stopped");
    }

    async fn on_failure(&self, e: &StorageError) {
        error!("retraining failed: {e}");
        self.components.status.record_failure();

        tokio::select! {
            _ = tokio::time::sleep(self.config.failure_backoff()) => {}
            _ = self.shutdown.cancelled() => {}
        }
    }

    #[instrument(skip(self))]
    async fn retrain(&self, now: DateTime<Utc>) -> Result<RetrainReport, StorageError> {
        let components = &self.components;

        let new_rows = components
            .storage
            .count_metrics_since(now - TimeDelta::days(1))
            .await?;
        if new_rows <= self.config.min_new_rows {
            debug!(
                "skipping retraining, {new_rows} new rows (need more than {})",
                self.config.min_new_rows
            );
            return Ok(RetrainReport::Skipped {
                new_rows,
                required: self.config.min_new_rows,
            });
        }

        let snapshots: Vec<_> = components
            .storage
            .metrics_since(now - TimeDelta::days(TRAINING_WINDOW_DAYS))
            .await?
            .into_iter()
            .map(|row| row.snapshot)
            .collect();

        let predictor = components.predictor.clone();
        let failure = tokio::task::spawn_blocking(move || predictor.retrain(&snapshots))
            .await
            .unwrap_or_else(|e| TrainOutcome::Failed(e.to_string()));
        let sizing = components.strategy.retrain().await?;

        let metrics_removed = match self.retention_days {
            Some(days) => {
                components
                    .storage
                    .cleanup_old_metrics(now - TimeDelta::days(i64::from(days)))
                    .await?
            }
            None => 0,
        };

        info!(
            "models retrained on {new_rows} new rows: failure {failure:?}, sizing {sizing:?}, {metrics_removed} old metric rows removed"
        );

        Ok(RetrainReport::Retrained {
            failure,
            sizing,
            metrics_removed,
        })
    }
}

/// Handle for controlling a RetrainActor
#[derive(Clone)]
pub struct RetrainHandle {
    sender: mpsc::Sender<RetrainCommand>,
}

impl RetrainHandle {
    pub fn spawn(
        components: Components,
        config: RetrainingConfig,
        retention_days: Option<u32>,
        shutdown: ShutdownSignal,
    ) -> (Self, JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = RetrainActor::new(components, config, retention_days, cmd_rx, shutdown);
        let task = tokio::spawn(actor.run());

        (Self { sender: cmd_tx }, task)
    }

    /// Check for new data and retrain immediately
    pub async fn run_now(&self) -> Result<RetrainReport> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RetrainCommand::RunNow { respond_to: tx })
            .await
            .context("failed to send RunNow command")?;

        Ok(rx.await.context("failed to receive response")??)
    }
}
