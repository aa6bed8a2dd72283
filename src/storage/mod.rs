//! Persistent store for metrics, alerts and backup records
//!
//! ## Design
//!
//! - **Trait-based**: `StorageBackend` trait allows swapping implementations
//! - **Async**: All operations are async so no activity blocks on the database
//! - **Shared**: One `Arc<dyn StorageBackend>` is handed to every activity
//!
//! ## Backends
//!
//! - **SQLite** (default): Embedded database
//! - **In-Memory** (fallback): No persistence, for testing or `backend: none`
//!
//! ## Usage
//!
//! ```no_run
//! use hostwarden::storage::{StorageBackend, sqlite::SqliteBackend};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let backend = SqliteBackend::new("./hostwarden.db").await?;
//!     println!("{}", backend.get_stats().await?);
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use tracing::info;

pub mod backend;
pub mod error;
pub mod memory;
pub mod schema;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::{HealthStatus, StorageBackend};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryBackend;
pub use schema::{AlertRow, MetricRow};

use crate::config::StorageConfig;

/// Build the backend selected in the configuration
pub async fn open(config: &StorageConfig) -> StorageResult<Arc<dyn StorageBackend>> {
    match config {
        StorageConfig::None => {
            info!("using in-memory storage, nothing survives a restart");
            Ok(Arc::new(MemoryBackend::new()))
        }
        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path, .. } => Ok(Arc::new(sqlite::SqliteBackend::new(path).await?)),
        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => {
            tracing::warn!("sqlite support not compiled in, falling back to in-memory storage");
            Ok(Arc::new(MemoryBackend::new()))
        }
    }
}
