use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use super::{Alert, AlertKind, Channel, DeliveryResult, Severity};
use crate::storage::{AlertRow, StorageBackend};
use crate::transports::Transports;

/// What happened to one admitted alert
#[derive(Debug, Clone)]
pub struct DispatchReport {
    /// The alert with one delivery result per attempted channel
    pub alert: Alert,
    pub skipped: Vec<Channel>,
    pub persisted: bool,
}

impl DispatchReport {
    /// No attempted channel failed. Skipped channels do not count.
    pub fn delivered(&self) -> bool {
        !self.alert.any_delivery_failed()
    }
}

/// Running counters of the dispatcher
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DispatchStats {
    pub sent: HashMap<Channel, u64>,
    pub failed: HashMap<Channel, u64>,
    pub skipped: HashMap<Channel, u64>,
    pub by_severity: HashMap<Severity, u64>,
    pub by_kind: HashMap<AlertKind, u64>,
}

impl DispatchStats {
    pub fn total_dispatched(&self) -> u64 {
        self.by_kind.values().sum()
    }
}

/// Fans an admitted alert out to the channels of its severity and persists
/// the outcome
pub struct AlertDispatcher {
    transports: Transports,
    storage: Arc<dyn StorageBackend>,
    stats: Mutex<DispatchStats>,
}

impl AlertDispatcher {
    pub fn new(transports: Transports, storage: Arc<dyn StorageBackend>) -> Self {
        Self {
            transports,
            storage,
            stats: Mutex::new(DispatchStats::default()),
        }
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    #[instrument(skip_all, fields(alert = alert.id(), kind = %alert.kind()))]
    pub async fn dispatch(&self, mut alert: Alert, priority: u8) -> DispatchReport {
        let channels = alert.severity().channels();
        if channels.is_empty() {
            info!("{}: {}", alert.kind(), alert.message());
        }

        let mut skipped = vec![];
        let mut targets = vec![];
        for channel in channels {
            match self.transports.get(*channel) {
                Some(transport) if transport.is_active() => targets.push(transport.clone()),
                _ => {
                    debug!("{channel} channel is inactive, skipping");
                    skipped.push(*channel);
                }
            }
        }

        let attempted_at = Utc::now();
        let outcomes = {
            let alert = &alert;
            join_all(targets.iter().map(|transport| async move {
                (transport.channel(), transport.send(alert).await)
            }))
            .await
        };

        for (channel, outcome) in outcomes {
            let error = match outcome {
                Ok(()) => None,
                Err(e) => {
                    warn!("delivery over {channel} failed: {e}");
                    Some(e.to_string())
                }
            };
            alert.record_delivery(DeliveryResult {
                channel,
                success: error.is_none(),
                attempted_at,
                error,
            });
        }

        let persisted = match self
            .storage
            .insert_alert(AlertRow::from_alert(&alert, priority))
            .await
        {
            Ok(()) => true,
            Err(e) => {
                error!("could not persist alert {}: {e}", alert.id());
                false
            }
        };

        self.update_stats(&alert, &skipped);

        DispatchReport {
            alert,
            skipped,
            persisted,
        }
    }

    fn update_stats(&self, alert: &Alert, skipped: &[Channel]) {
        let mut stats = self
            .stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        *stats.by_severity.entry(alert.severity()).or_default() += 1;
        *stats.by_kind.entry(alert.kind()).or_default() += 1;
        for delivery in alert.deliveries() {
            let counter = if delivery.success {
                &mut stats.sent
            } else {
                &mut stats.failed
            };
            *counter.entry(delivery.channel).or_default() += 1;
        }
        for channel in skipped {
            *stats.skipped.entry(*channel).or_default() += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::AlertDetails;
    use crate::error::DeliveryError;
    use crate::storage::MemoryBackend;
    use crate::transports::MockTransport;
    use chrono::TimeDelta;

    fn mock(channel: Channel, active: bool, fails: bool) -> Arc<MockTransport> {
        let mut transport = MockTransport::new();
        transport.expect_channel().return_const(channel);
        transport.expect_is_active().return_const(active);
        if active {
            transport.expect_send().times(1).returning(move |_| {
                if fails {
                    Err(DeliveryError::Status {
                        status: 500,
                        body: "boom".to_string(),
                    })
                } else {
                    Ok(())
                }
            });
        } else {
            transport.expect_send().never();
        }
        Arc::new(transport)
    }

    fn alert(severity: Severity) -> Alert {
        Alert::new(
            severity,
            "Disk usage at 99.0%",
            AlertDetails::DiskHigh {
                value: 99.0,
                threshold: 90.0,
            },
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_one_failure_does_not_block_others() {
        let storage = Arc::new(MemoryBackend::new());
        let transports = Transports::new()
            .with(mock(Channel::Telegram, true, true))
            .with(mock(Channel::Email, true, false))
            .with(mock(Channel::Webhook, true, false));
        let dispatcher = AlertDispatcher::new(transports, storage.clone());

        let report = dispatcher.dispatch(alert(Severity::Critical), 80).await;

        assert_eq!(report.alert.deliveries().len(), 3);
        assert!(!report.delivered());
        assert!(report.persisted);

        let stats = dispatcher.stats();
        assert_eq!(stats.failed.get(&Channel::Telegram), Some(&1));
        assert_eq!(stats.sent.get(&Channel::Email), Some(&1));
        assert_eq!(stats.total_dispatched(), 1);
    }

    #[tokio::test]
    async fn test_inactive_and_missing_channels_are_skipped() {
        let storage = Arc::new(MemoryBackend::new());
        let transports = Transports::new().with(mock(Channel::Telegram, false, false));
        let dispatcher = AlertDispatcher::new(transports, storage.clone());

        let report = dispatcher.dispatch(alert(Severity::High), 50).await;

        assert!(report.alert.deliveries().is_empty());
        assert_eq!(report.skipped, vec![Channel::Telegram, Channel::Email]);
        assert!(report.delivered());
    }

    #[tokio::test]
    async fn test_medium_alert_only_goes_to_email() {
        let storage = Arc::new(MemoryBackend::new());
        let transports = Transports::new()
            .with(mock(Channel::Email, true, false))
            .with(mock(Channel::Telegram, false, false));
        let dispatcher = AlertDispatcher::new(transports, storage.clone());

        let report = dispatcher.dispatch(alert(Severity::Medium), 30).await;

        assert_eq!(report.alert.deliveries().len(), 1);
        assert_eq!(report.alert.deliveries()[0].channel, Channel::Email);
        assert!(report.skipped.is_empty());
    }

    #[tokio::test]
    async fn test_alert_row_is_persisted_once() {
        let storage = Arc::new(MemoryBackend::new());
        let dispatcher = AlertDispatcher::new(Transports::new(), storage.clone());

        dispatcher.dispatch(alert(Severity::Info), 5).await;

        let count = storage
            .count_alerts_by_type_since(AlertKind::DiskHigh, Utc::now() - TimeDelta::hours(1))
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_persistence_failure_is_reported() {
        let storage = Arc::new(MemoryBackend::new());
        storage.close().await.unwrap();
        let dispatcher = AlertDispatcher::new(Transports::new(), storage);

        let report = dispatcher.dispatch(alert(Severity::Low), 10).await;

        assert!(!report.persisted);
        assert_eq!(dispatcher.stats().total_dispatched(), 1);
    }
}
