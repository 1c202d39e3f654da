//! Storage implementations.

use std::sync::Arc;

use tracing::info;

use crate::config::{StorageConfig, StorageType};

pub mod codec;
pub mod compression;
pub mod schema;
pub mod sql;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use crate::interfaces::{EventStore, EventStoreExt, Result, StorageError};
pub use schema::SchemaChange;
pub use sql::SqlEventStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteEventStore;

#[cfg(feature = "postgres")]
pub use postgres::PostgresEventStore;

/// Behaviour switches shared by every backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// Add columns for new properties to existing per-type tables.
    pub auto_migrate: bool,
    /// Gzip JSON-encoded values and the shared-table payload.
    pub compression: bool,
    /// All event types share the `Events` table.
    pub single_table: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            auto_migrate: true,
            compression: false,
            single_table: false,
        }
    }
}

/// Initialize storage based on configuration.
///
/// Returns the EventStore implementation for the configured storage type.
pub async fn init_storage(config: &StorageConfig) -> Result<Arc<dyn EventStore>> {
    if config.uri.trim().is_empty() {
        return Err(StorageError::InvalidArgument(
            "storage uri must not be blank".to_string(),
        ));
    }

    info!(
        storage_type = %config.storage_type,
        single_table = config.single_table,
        compression = config.compression,
        "Initializing storage"
    );

    let options = config.options();

    match config.storage_type {
        #[cfg(feature = "sqlite")]
        StorageType::Sqlite => {
            let pool = sqlite::connect(&config.uri).await?;
            Ok(Arc::new(SqliteEventStore::new(pool, options)))
        }
        #[cfg(feature = "postgres")]
        StorageType::Postgres => {
            let pool = postgres::connect(&config.uri).await?;
            Ok(Arc::new(PostgresEventStore::new(pool, options)))
        }
        #[allow(unreachable_patterns)]
        other => Err(StorageError::BackendUnavailable(format!(
            "{} support is not enabled in this build",
            other
        ))),
    }
}
