//! Unified SQL storage implementation.
//!
//! The event store is generic over the `SqlDatabase` trait; a macro
//! generates the I/O for each backend (PostgreSQL, SQLite), while planning
//! (schema, SELECT, codec) is shared.

mod event_store;
mod query;
mod select;

pub use event_store::SqlEventStore;
pub use query::{bind_values, to_positional, JsonMode, SqlDatabase, SqlDialect};
pub use select::{history_predicate, plan_select, SelectPlan};
