//! Persistence for metrics, alerts, service checks, logs and host snapshots
//!
//! Every job and the API share one `Arc<dyn StorageBackend>`. Two
//! implementations exist: SQLite (behind `storage-sqlite`, the default) and
//! an in-memory store used for `"backend": "none"` and in tests.
//!
//! ```no_run
//! use hostwatch::config::StorageConfig;
//!
//! # async fn open() -> anyhow::Result<()> {
//! let store = hostwatch::storage::connect(&StorageConfig::None).await?;
//! let health = store.health_check().await?;
//! assert!(health.healthy);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod error;
pub mod memory;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

use std::sync::Arc;

use tracing::info;

pub use backend::{CleanupStats, HealthStatus, QueryRange, RetentionPolicy, StorageBackend};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryBackend;

use crate::config::StorageConfig;

/// Open the backend selected by the configuration
pub async fn connect(config: &StorageConfig) -> anyhow::Result<Arc<dyn StorageBackend>> {
    match config {
        StorageConfig::None => {
            info!("using in-memory storage, nothing will be persisted");
            Ok(Arc::new(MemoryBackend::new()))
        }

        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path } => {
            let backend = sqlite::SqliteBackend::new(path).await?;
            Ok(Arc::new(backend))
        }

        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => {
            anyhow::bail!("sqlite storage requested but the storage-sqlite feature is disabled")
        }
    }
}
