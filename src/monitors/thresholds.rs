use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use crate::Snapshot;
use crate::alerts::{Alert, AlertDetails, Severity};
use crate::config::Thresholds;

/// Percentage above which a cpu alert is escalated to high
const CPU_ESCALATION: f64 = 90.0;

/// Percentage above which a memory or disk alert is escalated to high
const STORAGE_ESCALATION: f64 = 95.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceEvaluation {
    Ok,
    Exceeding,
    Escalated,
}

impl ResourceEvaluation {
    pub fn evaluate(value: f64, limit: f64, escalation: f64) -> ResourceEvaluation {
        // strictly above the limit counts as exceeding
        if value <= limit {
            return ResourceEvaluation::Ok;
        }

        if value > escalation {
            return ResourceEvaluation::Escalated;
        }

        ResourceEvaluation::Exceeding
    }

    fn severity(&self) -> Option<Severity> {
        match self {
            ResourceEvaluation::Ok => None,
            ResourceEvaluation::Exceeding => Some(Severity::Medium),
            ResourceEvaluation::Escalated => Some(Severity::High),
        }
    }
}

/// Turns a snapshot into resource alerts
///
/// Evaluation is stateless: the same snapshot always produces the same
/// alerts. Repetition is handled further down by the cooldown manager.
#[derive(Debug, Clone)]
pub struct ThresholdEvaluator {
    thresholds: Thresholds,
}

impl ThresholdEvaluator {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    #[instrument(skip_all)]
    pub fn evaluate(&self, snapshot: &Snapshot) -> Vec<Alert> {
        let Thresholds { cpu, memory, disk } = self.thresholds;
        let at = snapshot.timestamp;
        let mut alerts = vec![];

        let cpu_value = snapshot.cpu.percent as f64;
        if let Some(severity) = ResourceEvaluation::evaluate(cpu_value, cpu, CPU_ESCALATION).severity()
        {
            alerts.push(resource_alert(
                severity,
                format!("CPU usage at {cpu_value:.1}% (threshold {cpu:.0}%)"),
                AlertDetails::CpuHigh {
                    value: cpu_value,
                    threshold: cpu,
                },
                at,
            ));
        }

        let memory_value = snapshot.memory.percent as f64;
        if let Some(severity) =
            ResourceEvaluation::evaluate(memory_value, memory, STORAGE_ESCALATION).severity()
        {
            alerts.push(resource_alert(
                severity,
                format!("Memory usage at {memory_value:.1}% (threshold {memory:.0}%)"),
                AlertDetails::MemoryHigh {
                    value: memory_value,
                    threshold: memory,
                },
                at,
            ));
        }

        let disk_value = snapshot.disk.percent as f64;
        if let Some(severity) =
            ResourceEvaluation::evaluate(disk_value, disk, STORAGE_ESCALATION).severity()
        {
            alerts.push(resource_alert(
                severity,
                format!("Disk usage at {disk_value:.1}% (threshold {disk:.0}%)"),
                AlertDetails::DiskHigh {
                    value: disk_value,
                    threshold: disk,
                },
                at,
            ));
        }

        let zombies = snapshot.processes.zombie;
        if zombies > 0 {
            alerts.push(resource_alert(
                Severity::Low,
                format!("{zombies} zombie process(es) detected"),
                AlertDetails::ZombieProcesses { count: zombies },
                at,
            ));
        }

        if !alerts.is_empty() {
            debug!("snapshot raised {} alert(s)", alerts.len());
        }

        alerts
    }
}

fn resource_alert(
    severity: Severity,
    message: String,
    details: AlertDetails,
    at: DateTime<Utc>,
) -> Alert {
    Alert::new(severity, message, details, at)
}
