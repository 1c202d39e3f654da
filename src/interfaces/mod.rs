//! Abstract interfaces for eventshelf components.
//!
//! These traits define the contracts for:
//! - Event storage (persistence and retrieval)
//! - Event dispatch (post-save notification)

pub mod event_dispatcher;
pub mod event_store;

pub use event_dispatcher::EventDispatcher;
pub use event_store::{EventStore, EventStoreExt, Result, StorageError};
