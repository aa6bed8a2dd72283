//! Row types persisted by the storage backends
//!
//! ## Design
//!
//! Metric rows keep the handful of aggregates that queries and training need
//! as typed columns, and the complete [`Snapshot`] as JSON next to them:
//! - `cpu_percent`, `memory_percent`, `disk_percent`, `load_one`
//! - `process_count`, `zombie_count`
//! - `snapshot` (everything else, rarely queried)
//!
//! Alert rows store the typed details and the delivery outcomes as JSON, so a
//! single row describes everything that happened to an admitted alert.
//!
//! All timestamps are stored as Unix milliseconds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Snapshot;
use crate::alerts::{Alert, AlertDetails, AlertKind, DeliveryResult, Severity};

/// One monitoring tick as stored in the `metrics` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRow {
    /// When the snapshot was collected (always UTC)
    pub timestamp: DateTime<Utc>,

    pub cpu_percent: f32,
    pub memory_percent: f32,
    pub disk_percent: f32,
    pub load_one: f64,
    pub process_count: u64,
    pub zombie_count: u64,

    /// Complete snapshot, serialized to JSON only when written to the database
    pub snapshot: Snapshot,
}

impl MetricRow {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self {
            timestamp: snapshot.timestamp,
            cpu_percent: snapshot.cpu.percent,
            memory_percent: snapshot.memory.percent,
            disk_percent: snapshot.disk.percent,
            load_one: snapshot.cpu.load_average.one,
            process_count: snapshot.processes.total as u64,
            zombie_count: snapshot.processes.zombie as u64,
            snapshot: snapshot.clone(),
        }
    }
}

/// An admitted alert together with its priority and delivery outcomes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRow {
    pub id: String,
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
    pub details: AlertDetails,
    pub priority: u8,
    pub deliveries: Vec<DeliveryResult>,
    pub created_at: DateTime<Utc>,
}

impl AlertRow {
    pub fn from_alert(alert: &Alert, priority: u8) -> Self {
        Self {
            id: alert.id().to_string(),
            kind: alert.kind(),
            severity: alert.severity(),
            message: alert.message().to_string(),
            details: alert.details().clone(),
            priority,
            deliveries: alert.deliveries().to_vec(),
            created_at: alert.created_at(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::Channel;

    #[test]
    fn test_metric_row_from_snapshot() {
        let mut snapshot = Snapshot::default();
        snapshot.cpu.percent = 55.5;
        snapshot.memory.percent = 70.0;
        snapshot.disk.percent = 42.0;
        snapshot.cpu.load_average.one = 1.25;
        snapshot.processes.total = 321;
        snapshot.processes.zombie = 2;

        let row = MetricRow::from_snapshot(&snapshot);

        assert_eq!(row.cpu_percent, 55.5);
        assert_eq!(row.memory_percent, 70.0);
        assert_eq!(row.disk_percent, 42.0);
        assert_eq!(row.load_one, 1.25);
        assert_eq!(row.process_count, 321);
        assert_eq!(row.zombie_count, 2);
        assert_eq!(row.snapshot, snapshot);
    }

    #[test]
    fn test_alert_row_carries_deliveries() {
        let mut alert = Alert::new(
            Severity::Medium,
            "Memory usage at 88.0%",
            AlertDetails::MemoryHigh {
                value: 88.0,
                threshold: 85.0,
            },
            Utc::now(),
        );
        alert.record_delivery(DeliveryResult {
            channel: Channel::Email,
            success: true,
            attempted_at: Utc::now(),
            error: None,
        });

        let row = AlertRow::from_alert(&alert, 47);

        assert_eq!(row.id, alert.id());
        assert_eq!(row.kind, AlertKind::MemoryHigh);
        assert_eq!(row.priority, 47);
        assert_eq!(row.deliveries.len(), 1);
    }
}
