//! eventshelf - relational event store
//!
//! Stores the events of event-sourced aggregates in SQL tables whose shape
//! follows the event types: one table per type (or one shared table), created
//! on first save and widened as types gain properties. Events are read back
//! with typed predicates compiled to parameterized SQL.

pub mod config;
pub mod event;
pub mod interfaces;
pub mod mapping;
pub mod predicate;
pub mod storage;
pub mod utils;


pub use event::{AnyEvent, DomainEvent, Event, EventMapping, EventRegistry, EventType};
pub use interfaces::{EventDispatcher, EventStore, EventStoreExt, StorageError};
pub use mapping::{Property, PropertyKind};
pub use predicate::{field, lit, Expr};
pub use storage::{init_storage, StoreOptions};
