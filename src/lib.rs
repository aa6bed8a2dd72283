pub mod actors;
pub mod alerts;
pub mod backup;
pub mod config;
pub mod error;
pub mod monitors;
pub mod orchestrator;
pub mod prediction;
pub mod storage;
pub mod transports;
pub mod util;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time view of the host, produced once per monitoring tick.
///
/// A snapshot is never mutated after collection. When parts of the host could
/// not be read, the affected section keeps its default values and a note is
/// pushed to `warnings`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    pub cpu: CpuOverview,
    pub memory: MemoryInformation,
    pub disk: DiskOverview,
    pub network: NetworkOverview,
    pub processes: ProcessOverview,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl Snapshot {
    pub fn is_partial(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuOverview {
    pub percent: f32,
    pub per_core: Vec<f32>,
    pub load_average: LoadAverage,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadAverage {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryInformation {
    pub percent: f32,
    pub total: u64,
    pub used: u64,
    pub available: u64,
    pub total_swap: u64,
    pub used_swap: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskOverview {
    /// Usage across all mounts, weighted by mount size
    pub percent: f32,
    pub total: u64,
    pub used: u64,
    pub mounts: Vec<MountInformation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MountInformation {
    pub mount_point: String,
    pub percent: f32,
    pub total: u64,
    pub available: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkOverview {
    pub bytes_received: u64,
    pub bytes_transmitted: u64,
    pub packets_received: u64,
    pub packets_transmitted: u64,
    /// Not every platform exposes socket counts
    pub connections: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessOverview {
    pub total: usize,
    pub running: usize,
    pub sleeping: usize,
    pub zombie: usize,
    pub top_cpu: Vec<ProcessInformation>,
    pub top_memory: Vec<ProcessInformation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessInformation {
    pub pid: u32,
    pub name: String,
    pub cpu_percent: f32,
    pub memory: u64,
}
