//! Event storage interface.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::event::{AnyEvent, Event, EventMapping, EventType};
use crate::predicate::{Expr, PredicateError};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unsupported predicate: {0}")]
    Predicate(#[from] PredicateError),

    #[error("No property of {type_name} matches column {column}")]
    MissingMember { type_name: String, column: String },

    #[error("Cannot encode property {property} of {type_name}: {reason}")]
    Encode {
        type_name: String,
        property: String,
        reason: String,
    },

    #[error("Cannot decode column {column} of {type_name}: {reason}")]
    Decode {
        type_name: String,
        column: String,
        reason: String,
    },

    #[error("Query build error: {0}")]
    QueryBuild(#[from] sea_query::error::Error),

    #[error("Event type not registered: {0}")]
    UnregisteredEventType(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Compression error: {0}")]
    Compression(#[from] std::io::Error),

    #[error("Dispatch failed: {0}")]
    Dispatch(String),

    #[error("Storage backend not available: {0}")]
    BackendUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

/// Interface for event persistence.
///
/// Implementations:
/// - `SqliteEventStore`: SQLite storage
/// - `PostgresEventStore`: PostgreSQL storage
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist one event, creating or migrating its table first.
    async fn save(&self, event: &dyn AnyEvent) -> Result<()>;

    /// All stored events of `event_type` matching `predicate`.
    ///
    /// A table that was never created yields an empty result.
    async fn find_by_type(
        &self,
        event_type: EventType,
        predicate: &Expr,
    ) -> Result<Vec<Box<dyn AnyEvent>>>;

    /// History of one aggregate up to `point_in_time`, oldest first.
    ///
    /// Events without a timeline are always included. With `timeline_id`
    /// set, events on that timeline are included too.
    async fn retrieve_events(
        &self,
        aggregate_id: Uuid,
        point_in_time: DateTime<Utc>,
        mappings: &[EventMapping],
        timeline_id: Option<Uuid>,
    ) -> Result<Vec<Box<dyn AnyEvent>>>;
}

/// Typed find over any [`EventStore`].
#[async_trait]
pub trait EventStoreExt: EventStore {
    async fn find<E: Event>(&self, predicate: &Expr) -> Result<Vec<E>> {
        let events = self.find_by_type(EventType::of::<E>(), predicate).await?;
        Ok(events
            .into_iter()
            .filter_map(|event| event.downcast::<E>())
            .collect())
    }
}

impl<S: EventStore + ?Sized> EventStoreExt for S {}
