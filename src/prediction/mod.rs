//! Predictive models behind explicit availability states
//!
//! A model that has not been trained answers with [`ModelOutput::NotTrained`]
//! instead of an error, so callers always have a heuristic fallback path.
//! Training never swaps in a half-built model: the previous state stays in
//! place unless [`TrainOutcome::Trained`] is returned.

pub mod failure;
pub mod sizing;

use serde::{Deserialize, Serialize};

use crate::Snapshot;

pub use failure::{BaselineFailureModel, FailureModel, FailurePrediction, FailurePredictor};
pub use sizing::{BackupModel, BaselineBackupModel};

#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutput<T> {
    NotTrained,
    Ready(T),
}

impl<T> ModelOutput<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, ModelOutput::Ready(_))
    }

    pub fn ready(self) -> Option<T> {
        match self {
            ModelOutput::Ready(value) => Some(value),
            ModelOutput::NotTrained => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrainOutcome {
    Trained(TrainingMetrics),
    InsufficientData { rows: usize, required: usize },
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingMetrics {
    pub samples: usize,
    /// Model-specific quality figure, higher is better
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Minimal,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_probability(probability: f64) -> Self {
        if probability >= 0.8 {
            RiskLevel::Critical
        } else if probability >= 0.6 {
            RiskLevel::High
        } else if probability >= 0.4 {
            RiskLevel::Medium
        } else if probability >= 0.2 {
            RiskLevel::Low
        } else {
            RiskLevel::Minimal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Minimal => "minimal",
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureContribution {
    pub name: String,
    pub value: f64,
    /// Standard deviations above the learned baseline
    pub score: f64,
}

pub const FEATURE_COUNT: usize = 10;

/// Names of the features extracted by [`feature_vector`], in order
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "cpu_percent",
    "memory_percent",
    "disk_percent",
    "swap_percent",
    "load_one",
    "load_five",
    "load_fifteen",
    "process_count",
    "zombie_count",
    "max_core_percent",
];

pub fn feature_vector(snapshot: &Snapshot) -> [f64; FEATURE_COUNT] {
    let swap_percent = if snapshot.memory.total_swap > 0 {
        snapshot.memory.used_swap as f64 / snapshot.memory.total_swap as f64 * 100.0
    } else {
        0.0
    };
    let max_core = snapshot
        .cpu
        .per_core
        .iter()
        .copied()
        .fold(0.0f32, f32::max);

    [
        snapshot.cpu.percent as f64,
        snapshot.memory.percent as f64,
        snapshot.disk.percent as f64,
        swap_percent,
        snapshot.cpu.load_average.one,
        snapshot.cpu.load_average.five,
        snapshot.cpu.load_average.fifteen,
        snapshot.processes.total as f64,
        snapshot.processes.zombie as f64,
        max_core as f64,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_levels() {
        assert_eq!(RiskLevel::from_probability(0.05), RiskLevel::Minimal);
        assert_eq!(RiskLevel::from_probability(0.2), RiskLevel::Low);
        assert_eq!(RiskLevel::from_probability(0.45), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_probability(0.7), RiskLevel::High);
        assert_eq!(RiskLevel::from_probability(0.95), RiskLevel::Critical);
    }

    #[test]
    fn test_feature_vector_handles_missing_swap() {
        let mut snapshot = Snapshot::default();
        snapshot.cpu.percent = 50.0;
        snapshot.cpu.per_core = vec![20.0, 80.0];
        snapshot.processes.zombie = 2;

        let features = feature_vector(&snapshot);

        assert_eq!(features[0], 50.0);
        assert_eq!(features[3], 0.0);
        assert_eq!(features[8], 2.0);
        assert_eq!(features[9], 80.0);
    }

    #[test]
    fn test_model_output_ready() {
        assert!(ModelOutput::Ready(1).is_ready());
        assert_eq!(ModelOutput::<u8>::NotTrained.ready(), None);
    }
}
