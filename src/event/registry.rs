//! Process-wide discriminator registry.
//!
//! Shared-table rows store only a type identity string; reading them back
//! needs that string resolved to a decoder. Host applications register their
//! event types once at startup.

use std::collections::HashMap;
use std::sync::{OnceLock, PoisonError, RwLock};

use tracing::debug;

use super::{Event, EventType};

static GLOBAL: OnceLock<EventRegistry> = OnceLock::new();

/// Maps stable type identities to event descriptors.
#[derive(Debug, Default)]
pub struct EventRegistry {
    types: RwLock<HashMap<&'static str, EventType>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry consulted by the stores.
    pub fn global() -> &'static EventRegistry {
        GLOBAL.get_or_init(EventRegistry::new)
    }

    /// Register `E` under its `TYPE_NAME`. Registering twice is a no-op.
    pub fn register<E: Event>(&self) -> EventType {
        let event_type = EventType::of::<E>();
        self.register_type(event_type);
        event_type
    }

    pub fn register_type(&self, event_type: EventType) {
        let mut types = self.types.write().unwrap_or_else(PoisonError::into_inner);
        if types.insert(event_type.type_name(), event_type).is_none() {
            debug!(type_name = %event_type.type_name(), "Registered event type");
        }
    }

    pub fn resolve(&self, type_name: &str) -> Option<EventType> {
        let types = self.types.read().unwrap_or_else(PoisonError::into_inner);
        types.get(type_name).copied()
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.resolve(type_name).is_some()
    }
}
