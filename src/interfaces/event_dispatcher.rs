//! Post-save dispatch hook.

use async_trait::async_trait;

use super::event_store::Result;
use crate::event::AnyEvent;

/// Receives every event after it has been stored.
///
/// Dispatch semantics (fan-out, delivery guarantees) belong to the
/// implementation. A dispatch error is returned from `save`, but the event
/// is already persisted at that point.
#[async_trait]
pub trait EventDispatcher: Send + Sync {
    async fn dispatch(&self, event: &dyn AnyEvent) -> Result<()>;
}
