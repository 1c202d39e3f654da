//! Storage configuration types.

use std::fmt;

use serde::Deserialize;

use crate::storage::StoreOptions;

/// Storage type discriminator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    #[default]
    Sqlite,
    Postgres,
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageType::Sqlite => f.write_str("sqlite"),
            StorageType::Postgres => f.write_str("postgres"),
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage type discriminator.
    #[serde(rename = "type")]
    pub storage_type: StorageType,
    /// SQLite path or `sqlite:` URL, or a PostgreSQL connection URI.
    pub uri: String,
    /// Add columns for new event properties to existing tables.
    pub auto_migrate: bool,
    /// Gzip JSON-encoded values.
    pub compression: bool,
    /// Store all event types in one shared table.
    pub single_table: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_type: StorageType::Sqlite,
            uri: "data/events.db".to_string(),
            auto_migrate: true,
            compression: false,
            single_table: false,
        }
    }
}

impl StorageConfig {
    pub fn options(&self) -> StoreOptions {
        StoreOptions {
            auto_migrate: self.auto_migrate,
            compression: self.compression,
            single_table: self.single_table,
        }
    }
}
