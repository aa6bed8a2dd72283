use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use super::cooldown::{Admission, CooldownEngine, CooldownStatus};
use super::dispatcher::{AlertDispatcher, DispatchReport, DispatchStats};
use super::priority::{PriorityEngine, PriorityScore, SuggestedAction, suggest_action};
use super::{Alert, AlertKind};
use crate::config::AlertsConfig;
use crate::storage::StorageBackend;
use crate::transports::Transports;

#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    Suppressed {
        kind: AlertKind,
        remaining: Duration,
    },
    Dispatched {
        report: DispatchReport,
        priority: PriorityScore,
        action: SuggestedAction,
    },
}

impl PipelineOutcome {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, PipelineOutcome::Dispatched { .. })
    }
}

/// Cooldown gate, priority scoring and dispatch for every alert the engine raises
pub struct AlertPipeline {
    cooldown: CooldownEngine,
    priority: PriorityEngine,
    dispatcher: AlertDispatcher,
}

impl AlertPipeline {
    pub fn new(
        config: &AlertsConfig,
        transports: Transports,
        storage: Arc<dyn StorageBackend>,
    ) -> Self {
        Self {
            cooldown: CooldownEngine::new(config.widen_factor, config.decay_factor),
            priority: PriorityEngine::new(storage.clone()),
            dispatcher: AlertDispatcher::new(transports, storage),
        }
    }

    #[instrument(skip_all, fields(kind = %alert.kind(), severity = %alert.severity()))]
    pub async fn submit(&self, alert: Alert, now: DateTime<Utc>) -> PipelineOutcome {
        let permit = match self.cooldown.check(&alert, now).await {
            Admission::Admitted(permit) => permit,
            Admission::Suppressed { kind, remaining } => {
                debug!("{kind} suppressed for another {remaining:?}");
                return PipelineOutcome::Suppressed { kind, remaining };
            }
        };

        let priority = self.priority.score(&alert, now).await;
        let action = suggest_action(&alert);
        let report = self.dispatcher.dispatch(alert, priority.total()).await;
        permit.record(now, report.delivered());

        PipelineOutcome::Dispatched {
            report,
            priority,
            action,
        }
    }

    pub async fn cooldown_status(&self, now: DateTime<Utc>) -> Vec<CooldownStatus> {
        self.cooldown.status(now).await
    }

    pub fn dispatch_stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }
}
