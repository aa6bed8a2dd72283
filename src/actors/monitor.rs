//! MonitorActor - Collects snapshots and raises alerts
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → collect → thresholds → predict → AlertPipeline → insert_metric
//!     ↑
//!     └─── Commands (RunNow)
//! ```

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, instrument, warn};

use super::messages::{MonitorCommand, TickReport};
use crate::alerts::pipeline::PipelineOutcome;
use crate::config::MonitoringConfig;
use crate::error::AcquisitionError;
use crate::orchestrator::{Components, ShutdownSignal};
use crate::storage::MetricRow;

pub struct MonitorActor {
    components: Components,
    config: MonitoringConfig,
    command_rx: mpsc::Receiver<MonitorCommand>,
    shutdown: ShutdownSignal,
}

impl MonitorActor {
    pub fn new(
        components: Components,
        config: MonitoringConfig,
        command_rx: mpsc::Receiver<MonitorCommand>,
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
        debug!("starting monitor actor");

        let mut ticker = interval(self.config.interval());
        let shutdown = self.shutdown.clone();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("received shutdown signal");
                    break;
                }

                _ = ticker.tick() => {
                    tokio::select! {
                        result = self.tick() => {
                            if let Err(e) = result {
                                self.on_failure(&e).await;
                            }
                        }
                        _ = shutdown.cancelled() => break,
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        MonitorCommand::RunNow { respond_to } => {
                            debug!("received RunNow command");
                            let result = self.tick().await;
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

        debug!("monitor actor stopped");
    }

    async fn on_failure(&self, e: &AcquisitionError) {
        error!("monitoring tick failed: {e}");
        self.components.status.record_failure();

        tokio::select! {
            _ = tokio::time::sleep(self.config.failure_backoff()) => {}
            _ = self.shutdown.cancelled() => {}
        }
    }

    #[instrument(skip(self))]
    async fn tick(&self) -> Result<TickReport, AcquisitionError> {
        let components = &self.components;
        let snapshot = components.source.collect().await?;
        let now = Utc::now();

        let mut alerts = components.evaluator.evaluate(&snapshot);

        let mut failure_probability = 0.0;
        if self.config.prediction.enabled {
            let verdict = components.predictor.evaluate(&snapshot);
            failure_probability = verdict.probability();
            alerts.extend(verdict.alert);
        }

        let mut report = TickReport {
            collected_at: snapshot.timestamp,
            partial: snapshot.is_partial(),
            raised: alerts.len(),
            failure_probability,
            ..Default::default()
        };

        for alert in alerts {
            match components.pipeline.submit(alert, now).await {
                PipelineOutcome::Dispatched { .. } => report.dispatched += 1,
                PipelineOutcome::Suppressed { .. } => report.suppressed += 1,
            }
        }

        report.metric_persisted = match components
            .storage
            .insert_metric(MetricRow::from_snapshot(&snapshot))
            .await
        {
            Ok(()) => true,
            Err(e) => {
                error!("could not persist metrics: {e}");
                false
            }
        };

        components.status.update(|status| {
            status.last_tick_at = Some(now);
            status.total_alerts += report.dispatched as u64;
            status.suppressed_alerts += report.suppressed as u64;
            status.last_cpu_percent = Some(snapshot.cpu.percent);
            status.last_memory_percent = Some(snapshot.memory.percent);
            status.last_disk_percent = Some(snapshot.disk.percent);
        });

        debug!(
            "tick done: {} raised, {} dispatched, {} suppressed",
            report.raised, report.dispatched, report.suppressed
        );
        Ok(report)
    }
}

/// Handle for controlling a MonitorActor
#[derive(Clone)]
pub struct MonitorHandle {
    sender: mpsc::Sender<MonitorCommand>,
}

impl MonitorHandle {
    pub fn spawn(
        components: Components,
        config: MonitoringConfig,
        shutdown: ShutdownSignal,
    ) -> (Self, JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = MonitorActor::new(components, config, cmd_rx, shutdown);
        let task = tokio::spawn(actor.run());

        (Self { sender: cmd_tx }, task)
    }

    /// Run a monitoring tick immediately
    pub async fn run_now(&self) -> Result<TickReport> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(MonitorCommand::RunNow { respond_to: tx })
            .await
            .context("failed to send RunNow command")?;

        Ok(rx.await.context("failed to receive response")??)
    }
}
