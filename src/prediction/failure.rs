//! Failure prediction from learned per-feature baselines

use std::sync::{Arc, RwLock};

use tracing::{debug, trace, warn};

use super::{
    FEATURE_COUNT, FEATURE_NAMES, FeatureContribution, ModelOutput, RiskLevel, TrainOutcome,
    TrainingMetrics, feature_vector,
};
use crate::Snapshot;
use crate::alerts::{Alert, AlertDetails, Severity};

/// Minimum spread assumed for a feature, in the feature's own unit
const MIN_STD_DEV: f64 = 1.0;

/// Deviation (in standard deviations) that maps to a probability of 0.5
const LOGISTIC_MIDPOINT: f64 = 3.0;

const LOGISTIC_STEEPNESS: f64 = 1.5;

const TOP_FEATURES: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct FailurePrediction {
    pub probability: f64,
    pub risk: RiskLevel,
    pub top_features: Vec<FeatureContribution>,
}

/// Trainable failure model
pub trait FailureModel: Send + Sync {
    fn predict(&self, snapshot: &Snapshot) -> ModelOutput<FailurePrediction>;

    /// Train on historical snapshots. Must leave the current state untouched
    /// unless training succeeds.
    fn train(&self, history: &[Snapshot]) -> TrainOutcome;

    fn is_trained(&self) -> bool;
}

#[derive(Debug, Clone)]
struct FeatureBaseline {
    mean: [f64; FEATURE_COUNT],
    std_dev: [f64; FEATURE_COUNT],
}

impl FeatureBaseline {
    fn fit(history: &[Snapshot]) -> Option<Self> {
        let n = history.len() as f64;
        let mut mean = [0.0; FEATURE_COUNT];
        let mut sq = [0.0; FEATURE_COUNT];

        for snapshot in history {
            for (i, value) in feature_vector(snapshot).iter().enumerate() {
                mean[i] += value;
                sq[i] += value * value;
            }
        }

        let mut std_dev = [0.0; FEATURE_COUNT];
        for i in 0..FEATURE_COUNT {
            mean[i] /= n;
            let variance = (sq[i] / n - mean[i] * mean[i]).max(0.0);
            std_dev[i] = variance.sqrt().max(MIN_STD_DEV);
        }

        if mean.iter().chain(std_dev.iter()).any(|v| !v.is_finite()) {
            return None;
        }

        Some(Self { mean, std_dev })
    }

    fn deviations(&self, snapshot: &Snapshot) -> [f64; FEATURE_COUNT] {
        let values = feature_vector(snapshot);
        let mut scores = [0.0; FEATURE_COUNT];
        for i in 0..FEATURE_COUNT {
            scores[i] = (values[i] - self.mean[i]) / self.std_dev[i];
        }
        scores
    }

    fn probability(&self, snapshot: &Snapshot) -> f64 {
        let strongest = self
            .deviations(snapshot)
            .into_iter()
            .fold(0.0f64, f64::max);
        logistic(strongest)
    }
}

fn logistic(z: f64) -> f64 {
    1.0 / (1.0 + (-LOGISTIC_STEEPNESS * (z - LOGISTIC_MIDPOINT)).exp())
}

/// Anomaly model that learns the mean and spread of every feature and turns
/// the strongest upward deviation into a failure probability.
pub struct BaselineFailureModel {
    baseline: RwLock<Option<FeatureBaseline>>,
    min_samples: usize,
}

impl BaselineFailureModel {
    pub fn new(min_samples: usize) -> Self {
        Self {
            baseline: RwLock::new(None),
            min_samples: min_samples.max(2),
        }
    }
}

impl FailureModel for BaselineFailureModel {
    fn predict(&self, snapshot: &Snapshot) -> ModelOutput<FailurePrediction> {
        let guard = self
            .baseline
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let Some(baseline) = guard.as_ref() else {
            return ModelOutput::NotTrained;
        };

        let deviations = baseline.deviations(snapshot);
        let values = feature_vector(snapshot);
        let probability = baseline.probability(snapshot);

        let mut contributions: Vec<FeatureContribution> = (0..FEATURE_COUNT)
            .filter(|&i| deviations[i] > 0.0)
            .map(|i| FeatureContribution {
                name: FEATURE_NAMES[i].to_string(),
                value: values[i],
                score: deviations[i],
            })
            .collect();
        contributions.sort_by(|a, b| b.score.total_cmp(&a.score));
        contributions.truncate(TOP_FEATURES);

        ModelOutput::Ready(FailurePrediction {
            probability,
            risk: RiskLevel::from_probability(probability),
            top_features: contributions,
        })
    }

    fn train(&self, history: &[Snapshot]) -> TrainOutcome {
        if history.len() < self.min_samples {
            return TrainOutcome::InsufficientData {
                rows: history.len(),
                required: self.min_samples,
            };
        }

        let Some(baseline) = FeatureBaseline::fit(history) else {
            return TrainOutcome::Failed("history contains non-finite values".to_string());
        };

        // share of training samples the fitted model considers healthy
        let healthy = history
            .iter()
            .filter(|snapshot| baseline.probability(snapshot) < 0.5)
            .count();
        let metrics = TrainingMetrics {
            samples: history.len(),
            score: healthy as f64 / history.len() as f64,
        };

        *self
            .baseline
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(baseline);

        TrainOutcome::Trained(metrics)
    }

    fn is_trained(&self) -> bool {
        self.baseline
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }
}

/// Result of running the predictor on one snapshot
#[derive(Debug, Clone)]
pub struct PredictorVerdict {
    pub output: ModelOutput<FailurePrediction>,
    pub alert: Option<Alert>,
}

impl PredictorVerdict {
    /// Zero while the model is not trained
    pub fn probability(&self) -> f64 {
        match &self.output {
            ModelOutput::Ready(prediction) => prediction.probability,
            ModelOutput::NotTrained => 0.0,
        }
    }
}

/// Wraps a [`FailureModel`] and turns confident predictions into alerts
#[derive(Clone)]
pub struct FailurePredictor {
    model: Arc<dyn FailureModel>,
    threshold: f64,
}

impl FailurePredictor {
    pub fn new(model: Arc<dyn FailureModel>, threshold: f64) -> Self {
        Self { model, threshold }
    }

    pub fn evaluate(&self, snapshot: &Snapshot) -> PredictorVerdict {
        let output = self.model.predict(snapshot);

        let alert = match &output {
            ModelOutput::NotTrained => {
                trace!("failure model not trained, skipping prediction");
                None
            }
            ModelOutput::Ready(prediction) if prediction.probability > self.threshold => {
                debug!(
                    "failure probability {:.3} above threshold {:.3}",
                    prediction.probability, self.threshold
                );
                Some(self.build_alert(snapshot, prediction))
            }
            ModelOutput::Ready(prediction) => {
                trace!("failure probability {:.3}", prediction.probability);
                None
            }
        };

        PredictorVerdict { output, alert }
    }

    /// Retrain the wrapped model; the previous model stays active on failure
    pub fn retrain(&self, history: &[Snapshot]) -> TrainOutcome {
        let outcome = self.model.train(history);
        match &outcome {
            TrainOutcome::Trained(metrics) => {
                debug!("failure model trained on {} samples", metrics.samples)
            }
            TrainOutcome::InsufficientData { rows, required } => {
                debug!("not enough history to train failure model ({rows}/{required})")
            }
            TrainOutcome::Failed(reason) => warn!("failure model training failed: {reason}"),
        }
        outcome
    }

    pub fn is_trained(&self) -> bool {
        self.model.is_trained()
    }

    fn build_alert(&self, snapshot: &Snapshot, prediction: &FailurePrediction) -> Alert {
        let drivers = prediction
            .top_features
            .iter()
            .map(|feature| feature.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        Alert::new(
            Severity::High,
            format!(
                "Failure predicted with {:.1}% probability (risk {:?}), driven by {}",
                prediction.probability * 100.0,
                prediction.risk,
                if drivers.is_empty() { "none" } else { &drivers }
            ),
            AlertDetails::PredictedFailure {
                probability: prediction.probability,
                risk: prediction.risk,
                top_features: prediction.top_features.clone(),
            },
            snapshot.timestamp,
        )
    }
}
