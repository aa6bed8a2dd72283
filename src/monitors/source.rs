//! Metrics acquisition
//!
//! The engine only depends on [`MetricsSource`]. [`SysinfoSource`] is the
//! implementation used by the daemon; tests plug in their own sources.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sysinfo::{Disks, Networks, ProcessStatus, ProcessesToUpdate, System};
use tracing::{debug, instrument, trace};

use crate::error::AcquisitionError;
use crate::{
    CpuOverview, DiskOverview, LoadAverage, MemoryInformation, MountInformation, NetworkOverview,
    ProcessInformation, ProcessOverview, Snapshot,
};

/// Number of processes listed in the top-N tables
const TOP_PROCESSES: usize = 5;

/// Kernel socket tables counted as open connections
const SOCKET_TABLES: [&str; 4] = [
    "/proc/net/tcp",
    "/proc/net/tcp6",
    "/proc/net/udp",
    "/proc/net/udp6",
];

/// Produces point-in-time snapshots of the host
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Collect a snapshot. Partial failures are reported through
    /// `Snapshot::warnings`; only a total failure is an error.
    async fn collect(&self) -> Result<Snapshot, AcquisitionError>;
}

/// [`MetricsSource`] backed by `sysinfo`
///
/// The underlying `System` is kept between calls so CPU usage is measured
/// over the time between two ticks.
pub struct SysinfoSource {
    system: Arc<Mutex<System>>,
    timeout: Duration,
}

impl SysinfoSource {
    pub fn new(timeout: Duration) -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        system.refresh_memory();

        Self {
            system: Arc::new(Mutex::new(system)),
            timeout,
        }
    }
}

#[async_trait]
impl MetricsSource for SysinfoSource {
    #[instrument(skip(self))]
    async fn collect(&self) -> Result<Snapshot, AcquisitionError> {
        let system = self.system.clone();
        let task = tokio::task::spawn_blocking(move || {
            let mut system = system.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            read_snapshot(&mut system)
        });

        let snapshot = tokio::time::timeout(self.timeout, task)
            .await
            .map_err(|_| AcquisitionError::Timeout(self.timeout))?
            .map_err(|e| AcquisitionError::Task(e.to_string()))?;

        debug!(
            "collected snapshot: cpu {:.1}%, memory {:.1}%, disk {:.1}%",
            snapshot.cpu.percent, snapshot.memory.percent, snapshot.disk.percent
        );
        if snapshot.is_partial() {
            debug!("snapshot is partial: {:?}", snapshot.warnings);
        }

        Ok(snapshot)
    }
}

fn percent(part: u64, whole: u64) -> f32 {
    if whole == 0 {
        0.0
    } else {
        (part as f64 / whole as f64 * 100.0) as f32
    }
}

fn read_snapshot(system: &mut System) -> Snapshot {
    let mut warnings = vec![];

    system.refresh_cpu_usage();
    system.refresh_memory();
    system.refresh_processes(ProcessesToUpdate::All, true);

    let load = System::load_average();
    let cpu = CpuOverview {
        percent: system.global_cpu_usage(),
        per_core: system.cpus().iter().map(|cpu| cpu.cpu_usage()).collect(),
        load_average: LoadAverage {
            one: load.one,
            five: load.five,
            fifteen: load.fifteen,
        },
    };
    if cpu.per_core.is_empty() {
        warnings.push("cpu information unavailable".to_string());
    }

    let memory = MemoryInformation {
        percent: percent(system.used_memory(), system.total_memory()),
        total: system.total_memory(),
        used: system.used_memory(),
        available: system.available_memory(),
        total_swap: system.total_swap(),
        used_swap: system.used_swap(),
    };
    if memory.total == 0 {
        warnings.push("memory information unavailable".to_string());
    }

    let disks = Disks::new_with_refreshed_list();
    let mounts: Vec<MountInformation> = disks
        .list()
        .iter()
        .filter(|disk| disk.total_space() > 0)
        .map(|disk| MountInformation {
            mount_point: disk.mount_point().to_string_lossy().to_string(),
            percent: percent(
                disk.total_space().saturating_sub(disk.available_space()),
                disk.total_space(),
            ),
            total: disk.total_space(),
            available: disk.available_space(),
        })
        .collect();
    let disk_total: u64 = mounts.iter().map(|mount| mount.total).sum();
    let disk_used: u64 = mounts
        .iter()
        .map(|mount| mount.total.saturating_sub(mount.available))
        .sum();
    if mounts.is_empty() {
        warnings.push("no mounted disks found".to_string());
    }
    let disk = DiskOverview {
        percent: percent(disk_used, disk_total),
        total: disk_total,
        used: disk_used,
        mounts,
    };

    let networks = Networks::new_with_refreshed_list();
    let mut network = networks.list().values().fold(
        NetworkOverview::default(),
        |mut acc, data| {
            acc.bytes_received += data.total_received();
            acc.bytes_transmitted += data.total_transmitted();
            acc.packets_received += data.total_packets_received();
            acc.packets_transmitted += data.total_packets_transmitted();
            acc
        },
    );
    network.connections = count_connections();
    if network.connections.is_none() {
        warnings.push("connection count unavailable".to_string());
    }

    let processes = read_processes(system);
    trace!("{} processes, {} zombies", processes.total, processes.zombie);

    Snapshot {
        timestamp: Utc::now(),
        cpu,
        memory,
        disk,
        network,
        processes,
        warnings,
    }
}

fn count_connections() -> Option<u32> {
    let mut readable = false;
    let mut total = 0;
    for table in SOCKET_TABLES {
        let Ok(raw) = std::fs::read_to_string(table) else {
            continue;
        };
        readable = true;
        total += count_socket_rows(&raw);
    }
    readable.then_some(total)
}

/// Rows of a `/proc/net/{tcp,udp}*` table, without its header line
fn count_socket_rows(raw: &str) -> u32 {
    raw.lines()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .count() as u32
}

fn read_processes(system: &System) -> ProcessOverview {
    let mut overview = ProcessOverview::default();
    let mut listed: Vec<ProcessInformation> = Vec::with_capacity(system.processes().len());

    for (pid, process) in system.processes() {
        overview.total += 1;
        match process.status() {
            ProcessStatus::Run => overview.running += 1,
            ProcessStatus::Sleep | ProcessStatus::Idle => overview.sleeping += 1,
            ProcessStatus::Zombie => overview.zombie += 1,
            _ => {}
        }

        listed.push(ProcessInformation {
            pid: pid.as_u32(),
            name: process.name().to_string_lossy().to_string(),
            cpu_percent: process.cpu_usage(),
            memory: process.memory(),
        });
    }

    listed.sort_by(|a, b| b.cpu_percent.total_cmp(&a.cpu_percent));
    overview.top_cpu = listed.iter().take(TOP_PROCESSES).cloned().collect();

    listed.sort_by(|a, b| b.memory.cmp(&a.memory));
    overview.top_memory = listed.into_iter().take(TOP_PROCESSES).collect();

    overview
}
