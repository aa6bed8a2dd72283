//! Wiring and lifecycle of the engine
//!
//! ## Architecture Overview
//!
//! ```text
//!                  ┌───────────────────┐
//!                  │   Orchestrator    │
//!                  └─────────┬─────────┘
//!                            │ spawns
//!        ┌───────────────────┼───────────────────┐
//!        │                   │                   │
//! ┌──────▼───────┐   ┌───────▼──────┐   ┌────────▼──────┐
//! │ MonitorActor │   │ BackupActor  │   │ RetrainActor  │
//! └──────┬───────┘   └───────┬──────┘   └────────┬──────┘
//!        │                   │                   │
//!        └──── AlertPipeline ┴── StorageBackend ─┘
//! ```
//!
//! Every actor observes the same [`ShutdownSignal`] at its loop boundary and
//! publishes progress to the shared [`StatusBoard`]. Components never touch
//! the counters themselves; they return results and the actor records them.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::actors::{BackupHandle, MonitorHandle, RetrainHandle};
use crate::alerts::pipeline::AlertPipeline;
use crate::backup::{BackupExecutor, BackupStrategyEngine, DiskSpaceProbe, SpaceProbe};
use crate::config::Config;
use crate::monitors::{MetricsSource, SysinfoSource, ThresholdEvaluator};
use crate::prediction::{BaselineBackupModel, BaselineFailureModel, FailurePredictor};
use crate::storage::{self, StorageBackend};
use crate::transports::Transports;

/// Days of metric history the failure model is trained on
pub const TRAINING_WINDOW_DAYS: i64 = 7;

/// Cooperative cancellation observed by every activity
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown was requested or the trigger is gone
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        let _ = rx.wait_for(|triggered| *triggered).await;
    }
}

#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, ShutdownSignal { rx })
}

/// Live counters of the engine
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub started_at: DateTime<Utc>,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub total_alerts: u64,
    pub suppressed_alerts: u64,
    pub total_backups: u64,
    pub failures: u64,
    pub last_cpu_percent: Option<f32>,
    pub last_memory_percent: Option<f32>,
    pub last_disk_percent: Option<f32>,
}

/// Shared, watchable [`StatusSnapshot`]
#[derive(Debug, Clone)]
pub struct StatusBoard {
    tx: Arc<watch::Sender<StatusSnapshot>>,
}

impl StatusBoard {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        let (tx, _) = watch::channel(StatusSnapshot {
            started_at,
            ..Default::default()
        });
        Self { tx: Arc::new(tx) }
    }

    pub fn update(&self, modify: impl FnOnce(&mut StatusSnapshot)) {
        self.tx.send_modify(modify);
    }

    pub fn record_failure(&self) {
        self.update(|status| status.failures += 1);
    }

    pub fn get(&self) -> StatusSnapshot {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.tx.subscribe()
    }
}

/// Everything the activities share
#[derive(Clone)]
pub struct Components {
    pub storage: Arc<dyn StorageBackend>,
    pub source: Arc<dyn MetricsSource>,
    pub evaluator: ThresholdEvaluator,
    pub predictor: FailurePredictor,
    pub pipeline: Arc<AlertPipeline>,
    pub strategy: Arc<BackupStrategyEngine>,
    pub executor: Arc<BackupExecutor>,
    pub status: StatusBoard,
}

impl Components {
    /// Build the production components. Only failures here are fatal.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let storage = storage::open(&config.storage)
            .await
            .context("failed to open storage backend")?;
        let source: Arc<dyn MetricsSource> =
            Arc::new(SysinfoSource::new(config.monitoring.collect_timeout()));

        Ok(Self::assemble(config, storage, source, Transports::from_config(&config.alerts)))
    }

    /// Wire components around the given storage, source and transports
    pub fn assemble(
        config: &Config,
        storage: Arc<dyn StorageBackend>,
        source: Arc<dyn MetricsSource>,
        transports: Transports,
    ) -> Self {
        let prediction = &config.monitoring.prediction;
        let predictor = FailurePredictor::new(
            Arc::new(BaselineFailureModel::new(prediction.min_training_rows)),
            prediction.threshold,
        );

        let strategy = BackupStrategyEngine::new(
            storage.clone(),
            Arc::new(BaselineBackupModel::default()),
            config.backup.clone(),
        );
        let executor = BackupExecutor::new(&config.backup, storage.clone(), Arc::new(DiskSpaceProbe));
        let pipeline = AlertPipeline::new(&config.alerts, transports, storage.clone());

        Self {
            evaluator: ThresholdEvaluator::new(config.monitoring.thresholds),
            predictor,
            pipeline: Arc::new(pipeline),
            strategy: Arc::new(strategy),
            executor: Arc::new(executor),
            status: StatusBoard::new(Utc::now()),
            source,
            storage,
        }
    }

    /// Replace the probe the executor asks for free space
    pub fn with_space_probe(mut self, config: &Config, probe: Arc<dyn SpaceProbe>) -> Self {
        self.executor = Arc::new(BackupExecutor::new(&config.backup, self.storage.clone(), probe));
        self
    }

    /// Train the models on whatever history is already stored
    pub async fn warm_up(&self, now: DateTime<Utc>) {
        match self
            .storage
            .metrics_since(now - TimeDelta::days(TRAINING_WINDOW_DAYS))
            .await
        {
            Ok(rows) => {
                let snapshots: Vec<_> = rows.into_iter().map(|row| row.snapshot).collect();
                let predictor = self.predictor.clone();
                match tokio::task::spawn_blocking(move || predictor.retrain(&snapshots)).await {
                    Ok(outcome) => debug!("failure model warm-up: {outcome:?}"),
                    Err(e) => warn!("failure model warm-up panicked: {e}"),
                }
            }
            Err(e) => warn!("could not load metric history: {e}"),
        }

        match self.strategy.retrain().await {
            Ok(outcome) => debug!("sizing model warm-up: {outcome:?}"),
            Err(e) => warn!("could not load backup history: {e}"),
        }
    }
}

/// Running engine
pub struct Orchestrator {
    components: Components,
    monitor: MonitorHandle,
    backup: Option<BackupHandle>,
    retrain: Option<RetrainHandle>,
    trigger: ShutdownTrigger,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl Orchestrator {
    /// Spawn one actor per enabled activity
    pub fn start(config: &Config, components: Components) -> Self {
        let (trigger, signal) = shutdown_channel();
        let mut tasks = vec![];

        let (monitor, task) =
            MonitorHandle::spawn(components.clone(), config.monitoring.clone(), signal.clone());
        tasks.push(("monitor", task));

        let backup = if config.backup.enabled {
            let (handle, task) =
                BackupHandle::spawn(components.clone(), config.backup.clone(), signal.clone());
            tasks.push(("backup", task));
            Some(handle)
        } else {
            info!("backups disabled");
            None
        };

        let retrain = if config.retraining.enabled {
            let (handle, task) = RetrainHandle::spawn(
                components.clone(),
                config.retraining.clone(),
                config.storage.retention_days(),
                signal,
            );
            tasks.push(("retrain", task));
            Some(handle)
        } else {
            info!("retraining disabled");
            None
        };

        info!("orchestrator started {} activities", tasks.len());

        Self {
            components,
            monitor,
            backup,
            retrain,
            trigger,
            tasks,
        }
    }

    pub fn status(&self) -> StatusSnapshot {
        self.components.status.get()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<StatusSnapshot> {
        self.components.status.subscribe()
    }

    pub fn components(&self) -> &Components {
        &self.components
    }

    pub fn monitor(&self) -> &MonitorHandle {
        &self.monitor
    }

    pub fn backup(&self) -> Option<&BackupHandle> {
        self.backup.as_ref()
    }

    pub fn retrain(&self) -> Option<&RetrainHandle> {
        self.retrain.as_ref()
    }

    /// Flip the shutdown signal and wait for every activity to stop
    pub async fn shutdown(self) -> Result<()> {
        info!("shutting down");
        self.trigger.trigger();

        for (name, task) in self.tasks {
            match task.await {
                Ok(()) => debug!("{name} activity stopped"),
                Err(e) => error!("{name} activity ended abnormally: {e}"),
            }
        }

        self.components
            .storage
            .close()
            .await
            .context("failed to close storage")?;

        info!("shutdown complete");
        Ok(())
    }
}
