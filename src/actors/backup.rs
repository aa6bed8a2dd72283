//! BackupActor - Runs adaptive backups on a schedule
//!
//! A backup that already started is allowed to finish when shutdown is
//! requested, so its record always reaches the store.

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tracing::{debug, error, info, instrument, warn};

use super::messages::BackupCommand;
use crate::alerts::{Alert, AlertDetails, Severity};
use crate::backup::BackupOutcome;
use crate::config::BackupConfig;
use crate::error::BackupError;
use crate::orchestrator::{Components, ShutdownSignal};
use crate::storage::StorageError;

pub struct BackupActor {
    components: Components,
    config: BackupConfig,
    command_rx: mpsc::Receiver<BackupCommand>,
    shutdown: ShutdownSignal,
}

impl BackupActor {
    pub fn new(
        components: Components,
        config: BackupConfig,
        command_rx: mpsc::Receiver<BackupCommand>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            components,
            config,
            command_rx,
            shutdown,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting backup actor");

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
                    if let Err(e) = self.run_backup().await {
                        error!("could not plan backup: {e}");
                        self.backoff().await;
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        BackupCommand::RunNow { respond_to } => {
                            debug!("received RunNow command");
                            let _ = respond_to.send(self.run_backup().await);
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("backup actor stopped");
    }

    async fn backoff(&self) {
        tokio::select! {
            _ = tokio::time::sleep(self.config.failure_backoff()) => {}
            _ = self.shutdown.cancelled() => {}
        }
    }

    async fn report(&self, alert: Alert) {
        let outcome = self.components.pipeline.submit(alert, Utc::now()).await;
        self.components.status.update(|status| {
            if outcome.is_dispatched() {
                status.total_alerts += 1;
            } else {
                status.suppressed_alerts += 1;
            }
        });
    }

    /// strategy → execute → success or failure alert
    #[instrument(skip(self))]
    async fn run_backup(&self) -> Result<BackupOutcome, StorageError> {
        let components = &self.components;

        let strategy = match components.strategy.suggest(Utc::now()).await {
            Ok(strategy) => strategy,
            Err(e) => {
                components.status.record_failure();
                let alert = Alert::new(
                    Severity::High,
                    format!("Backup could not be planned: {e}"),
                    AlertDetails::BackupFailed {
                        backup_id: None,
                        backup_type: None,
                        error: e.to_string(),
                    },
                    Utc::now(),
                );
                self.report(alert).await;
                return Err(e);
            }
        };

        let outcome = components.executor.execute(&strategy).await;
        let record = outcome.record();

        let alert = match &outcome {
            BackupOutcome::Succeeded { pruned, .. } => {
                components.status.update(|status| status.total_backups += 1);
                info!(
                    "{} backup {} done ({pruned} expired backup(s) pruned)",
                    record.backup_type, record.id
                );
                Alert::new(
                    Severity::Info,
                    format!(
                        "{} backup {} completed: {:.2}MB in {:.1}s",
                        record.backup_type, record.id, record.size_mb, record.duration_secs
                    ),
                    AlertDetails::BackupSucceeded {
                        backup_id: record.id.clone(),
                        backup_type: record.backup_type,
                        size_mb: record.size_mb,
                        duration_secs: record.duration_secs,
                    },
                    Utc::now(),
                )
            }
            BackupOutcome::Failed { error, .. } => {
                components.status.record_failure();
                let message = match error {
                    BackupError::Space { .. } => format!("Backup aborted: {error}"),
                    _ => format!("{} backup {} failed: {error}", record.backup_type, record.id),
                };
                Alert::new(
                    Severity::High,
                    message,
                    AlertDetails::BackupFailed {
                        backup_id: Some(record.id.clone()),
                        backup_type: Some(record.backup_type),
                        error: error.to_string(),
                    },
                    Utc::now(),
                )
            }
        };

        self.report(alert).await;

        if !outcome.is_success() {
            self.backoff().await;
        }
        Ok(outcome)
    }
}

/// Handle for controlling a BackupActor
#[derive(Clone)]
pub struct BackupHandle {
    sender: mpsc::Sender<BackupCommand>,
}

impl BackupHandle {
    pub fn spawn(
        components: Components,
        config: BackupConfig,
        shutdown: ShutdownSignal,
    ) -> (Self, JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = BackupActor::new(components, config, cmd_rx, shutdown);
        let task = tokio::spawn(actor.run());

        (Self { sender: cmd_tx }, task)
    }

    /// Plan and execute a backup immediately
    pub async fn run_now(&self) -> Result<BackupOutcome> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(BackupCommand::RunNow { respond_to: tx })
            .await
            .context("failed to send RunNow command")?;

        Ok(rx.await.context("failed to receive response")??)
    }
}
