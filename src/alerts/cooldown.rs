//! Adaptive per-type suppression
//!
//! Every alert kind owns one [`CooldownState`]. Admission hands out a
//! [`CooldownPermit`] that keeps the state locked until the dispatch outcome
//! is recorded, so two alerts of the same kind never interleave their
//! read-modify-write. Different kinds never wait on each other.
//!
//! ```text
//! check(alert, now):
//!   first seen                      → admit, window = base(severity)
//!   now - last_sent_at < window     → suppress
//!   otherwise                       → admit
//!
//! permit.record(now, delivered):
//!   last_sent_at = now
//!   delivered    → window = max(window × decay, base(severity))
//!   not delivered → window = window × widen
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, instrument, trace};

use super::{Alert, AlertKind, Severity};

/// Mutable suppression state of one alert kind
#[derive(Debug, Clone, PartialEq)]
pub struct CooldownState {
    pub last_sent_at: Option<DateTime<Utc>>,
    pub window: Duration,
    /// Outcome of the last recorded dispatch
    pub last_delivery_ok: Option<bool>,
    pub suppressed: u64,
}

impl CooldownState {
    fn new(severity: Severity) -> Self {
        Self {
            last_sent_at: None,
            window: severity.base_cooldown(),
            last_delivery_ok: None,
            suppressed: 0,
        }
    }

    fn remaining(&self, now: DateTime<Utc>) -> Duration {
        let Some(last_sent_at) = self.last_sent_at else {
            return Duration::ZERO;
        };

        // a clock going backwards counts as no time elapsed
        let elapsed = (now - last_sent_at).to_std().unwrap_or(Duration::ZERO);
        self.window.saturating_sub(elapsed)
    }
}

/// Read-only view of one kind's cooldown, for operators
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CooldownStatus {
    pub kind: AlertKind,
    pub last_sent_at: Option<DateTime<Utc>>,
    pub window_secs: f64,
    pub remaining_secs: f64,
    pub last_delivery_ok: Option<bool>,
    pub suppressed: u64,
}

/// Result of the cooldown gate
#[derive(Debug)]
pub enum Admission {
    Admitted(CooldownPermit),
    Suppressed { kind: AlertKind, remaining: Duration },
}

/// Exclusive access to the cooldown state of one kind, held from admission
/// until the dispatch outcome is recorded
#[derive(Debug)]
pub struct CooldownPermit {
    state: OwnedMutexGuard<CooldownState>,
    kind: AlertKind,
    severity: Severity,
    widen_factor: f64,
    decay_factor: f64,
}

impl CooldownPermit {
    pub fn kind(&self) -> AlertKind {
        self.kind
    }

    /// Store the dispatch outcome and adapt the window
    pub fn record(mut self, now: DateTime<Utc>, delivered: bool) -> Duration {
        let base = self.severity.base_cooldown();
        let state = &mut *self.state;

        state.last_sent_at = Some(now);
        state.last_delivery_ok = Some(delivered);
        state.window = if delivered {
            state.window.mul_f64(self.decay_factor).max(base)
        } else {
            state.window.mul_f64(self.widen_factor)
        };

        debug!(
            "{}: cooldown window is now {:?} (delivered: {delivered})",
            self.kind, state.window
        );
        state.window
    }
}

/// Owner of every [`CooldownState`]
#[derive(Debug)]
pub struct CooldownEngine {
    states: Mutex<HashMap<AlertKind, Arc<AsyncMutex<CooldownState>>>>,
    widen_factor: f64,
    decay_factor: f64,
}

impl Default for CooldownEngine {
    fn default() -> Self {
        Self::new(1.5, 0.9)
    }
}

impl CooldownEngine {
    pub fn new(widen_factor: f64, decay_factor: f64) -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
            widen_factor,
            decay_factor,
        }
    }

    fn state_for(&self, kind: AlertKind, severity: Severity) -> Arc<AsyncMutex<CooldownState>> {
        let mut states = self
            .states
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        states
            .entry(kind)
            .or_insert_with(|| Arc::new(AsyncMutex::new(CooldownState::new(severity))))
            .clone()
    }

    /// Gate an alert. Waits while another alert of the same kind is being
    /// dispatched.
    #[instrument(skip_all, fields(kind = %alert.kind()))]
    pub async fn check(&self, alert: &Alert, now: DateTime<Utc>) -> Admission {
        let kind = alert.kind();
        let severity = alert.severity();
        let mut state = self.state_for(kind, severity).lock_owned().await;

        // the window never drops below the base of the severity at hand
        state.window = state.window.max(severity.base_cooldown());

        let remaining = state.remaining(now);
        if !remaining.is_zero() {
            state.suppressed += 1;
            trace!("{kind}: suppressed, {remaining:?} remaining");
            return Admission::Suppressed { kind, remaining };
        }

        trace!("{kind}: admitted");
        Admission::Admitted(CooldownPermit {
            state,
            kind,
            severity,
            widen_factor: self.widen_factor,
            decay_factor: self.decay_factor,
        })
    }

    /// Current window of a kind, `None` if the kind was never seen
    pub async fn window(&self, kind: AlertKind) -> Option<Duration> {
        let state = self
            .states
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&kind)
            .cloned()?;

        let window = state.lock().await.window;
        Some(window)
    }

    pub async fn status(&self, now: DateTime<Utc>) -> Vec<CooldownStatus> {
        let states: Vec<(AlertKind, Arc<AsyncMutex<CooldownState>>)> = self
            .states
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|(kind, state)| (*kind, state.clone()))
            .collect();

        let mut status = Vec::with_capacity(states.len());
        for (kind, state) in states {
            let state = state.lock().await;
            status.push(CooldownStatus {
                kind,
                last_sent_at: state.last_sent_at,
                window_secs: state.window.as_secs_f64(),
                remaining_secs: state.remaining(now).as_secs_f64(),
                last_delivery_ok: state.last_delivery_ok,
                suppressed: state.suppressed,
            });
        }
        status.sort_by_key(|entry| entry.kind);
        status
    }
}
