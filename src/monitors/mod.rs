//! Host observation: acquiring snapshots and turning them into alerts

pub mod source;
pub mod thresholds;

pub use source::{MetricsSource, SysinfoSource};
pub use thresholds::{ResourceEvaluation, ThresholdEvaluator};
