//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use hostwarden::{
    CpuOverview, DiskOverview, MemoryInformation, ProcessOverview, Snapshot,
    alerts::{Alert, AlertKind, Channel},
    config::{Config, StorageConfig},
    error::{AcquisitionError, DeliveryError},
    monitors::MetricsSource,
    transports::Transport,
};

/// Create a snapshot with the given usage percentages
pub fn create_test_snapshot(cpu: f32, memory: f32, disk: f32) -> Snapshot {
    Snapshot {
        timestamp: Utc::now(),
        cpu: CpuOverview {
            percent: cpu,
            per_core: vec![cpu, cpu],
            ..Default::default()
        },
        memory: MemoryInformation {
            percent: memory,
            total: 8 * 1024 * 1024 * 1024,
            ..Default::default()
        },
        disk: DiskOverview {
            percent: disk,
            ..Default::default()
        },
        processes: ProcessOverview {
            total: 120,
            running: 3,
            sleeping: 117,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Configuration with in-memory storage and intervals long enough that only
/// `run_now` triggers work
pub fn create_test_config(backup_root: &Path) -> Config {
    let mut config = Config::default();
    config.storage = StorageConfig::None;
    config.monitoring.interval_secs = 3600;
    config.monitoring.failure_backoff_secs = 0;
    config.monitoring.prediction.enabled = false;
    config.backup.interval_secs = 3600;
    config.backup.failure_backoff_secs = 0;
    config.backup.sources = vec![backup_root.join("data")];
    config.backup.destination = backup_root.join("backups");
    config.retraining.interval_secs = 3600;
    config.retraining.failure_backoff_secs = 0;
    config
}

/// Metrics source that replays a queue of results and then repeats the last one
pub struct ScriptedSource {
    script: Mutex<Vec<Result<Snapshot, ()>>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(script: Vec<Result<Snapshot, ()>>) -> Self {
        Self {
            script: Mutex::new(script),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn healthy() -> Self {
        Self::new(vec![Ok(create_test_snapshot(20.0, 40.0, 50.0))])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetricsSource for ScriptedSource {
    async fn collect(&self) -> Result<Snapshot, AcquisitionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().unwrap();
        let next = if script.len() > 1 {
            script.remove(0)
        } else {
            script[0].clone()
        };

        next.map(|mut snapshot| {
            snapshot.timestamp = Utc::now();
            snapshot
        })
        .map_err(|()| AcquisitionError::Task("scripted failure".to_string()))
    }
}

/// Transport that records what it was asked to deliver
pub struct RecordingTransport {
    channel: Channel,
    fail: bool,
    sent: Mutex<Vec<AlertKind>>,
}

impl RecordingTransport {
    pub fn new(channel: Channel) -> Arc<Self> {
        Arc::new(Self {
            channel,
            fail: false,
            sent: Mutex::new(vec![]),
        })
    }

    pub fn failing(channel: Channel) -> Arc<Self> {
        Arc::new(Self {
            channel,
            fail: true,
            sent: Mutex::new(vec![]),
        })
    }

    pub fn sent(&self) -> Vec<AlertKind> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn channel(&self) -> Channel {
        self.channel
    }

    fn is_active(&self) -> bool {
        true
    }

    async fn send(&self, alert: &Alert) -> Result<(), DeliveryError> {
        self.sent.lock().unwrap().push(alert.kind());
        if self.fail {
            return Err(DeliveryError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(())
    }
}

/// Write `content` to `root/relative`, creating parent directories
pub fn write_file(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}
