//! Actor-based activities of the engine
//!
//! Each activity runs as an independent async task. The orchestrator spawns
//! them and talks to them only through their handles.
//!
//! ## Architecture Overview
//!
//! ```text
//!                    ┌─────────────────┐
//!                    │  Orchestrator   │
//!                    └────────┬────────┘
//!                             │ spawns
//!              ┌──────────────┼──────────────┐
//!              │              │              │
//!      ┌───────▼──────┐ ┌─────▼──────┐ ┌─────▼────────┐
//!      │ MonitorActor │ │BackupActor │ │ RetrainActor │
//!      │ (interval)   │ │ (interval) │ │ (daily)      │
//!      └───────┬──────┘ └─────┬──────┘ └─────┬────────┘
//!              │              │              │
//!              └──────┬───────┘              │
//!                     │ alerts               │ models
//!            ┌────────▼────────┐    ┌────────▼────────┐
//!            │  AlertPipeline  │    │ Predictor/Sizer │
//!            └─────────────────┘    └─────────────────┘
//! ```
//!
//! ## Actor Types
//!
//! - **MonitorActor**: Collects snapshots, evaluates them and raises alerts
//! - **BackupActor**: Plans and executes backups, reports the outcome as an alert
//! - **RetrainActor**: Refreshes both models and sweeps expired metric rows
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: Each actor has an mpsc command channel for control messages
//! 2. **Shutdown**: A shared watch channel, observed at every loop boundary
//! 3. **Request/Response**: oneshot channels for synchronous queries

pub mod backup;
pub mod messages;
pub mod monitor;
pub mod retrain;

pub use backup::BackupHandle;
pub use messages::{RetrainReport, TickReport};
pub use monitor::MonitorHandle;
pub use retrain::RetrainHandle;
