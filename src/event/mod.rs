//! Event model: the base event shape and per-type descriptors.
//!
//! Concrete events embed a [`DomainEvent`] (serde `flatten`) and implement
//! [`Event`], which names the type and lists its stored properties. Stores
//! work on the object-safe [`AnyEvent`] view so one call can return events of
//! several types.

use std::any::Any;
use std::fmt;

use chrono::{DateTime, SubsecRound, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use uuid::Uuid;

use crate::mapping::{Property, PropertyKind};

mod registry;

pub use registry::EventRegistry;

/// Column holding the event identifier.
pub const ID: &str = "Id";
/// Column holding the optional timeline identifier.
pub const TIMELINE_ID: &str = "TimelineId";
/// Column holding the creation timestamp.
pub const TIME_STAMP: &str = "TimeStamp";

/// Properties every event carries.
pub const BASE_PROPERTIES: [Property; 3] = [
    Property::new(ID, PropertyKind::Uuid),
    Property::optional(TIMELINE_ID, PropertyKind::Uuid),
    Property::new(TIME_STAMP, PropertyKind::DateTime),
];

/// Base shape shared by all events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DomainEvent {
    pub id: Uuid,
    pub timeline_id: Option<Uuid>,
    pub time_stamp: DateTime<Utc>,
}

impl DomainEvent {
    /// Fresh header: random id, no timeline, current time.
    ///
    /// Timestamps are truncated to microseconds, the finest precision every
    /// backend stores.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            timeline_id: None,
            time_stamp: Utc::now().trunc_subsecs(6),
        }
    }

    pub fn on_timeline(mut self, timeline_id: Uuid) -> Self {
        self.timeline_id = Some(timeline_id);
        self
    }

    pub fn at(mut self, time_stamp: DateTime<Utc>) -> Self {
        self.time_stamp = time_stamp.trunc_subsecs(6);
        self
    }
}

impl Default for DomainEvent {
    fn default() -> Self {
        Self::new()
    }
}

/// Descriptor implemented by every storable event type.
///
/// `properties` lists the type's own stored properties by their serialized
/// (JSON) names; the base properties are always prepended.
///
/// ```ignore
/// #[derive(Debug, Serialize, Deserialize)]
/// #[serde(rename_all = "PascalCase")]
/// struct OrderPlaced {
///     #[serde(flatten)]
///     header: DomainEvent,
///     order_id: Uuid,
///     total: i64,
/// }
///
/// impl Event for OrderPlaced {
///     const NAME: &'static str = "OrderPlaced";
///     const TYPE_NAME: &'static str = "shop.orders.OrderPlaced";
///
///     fn properties() -> Vec<Property> {
///         vec![
///             Property::new("OrderId", PropertyKind::Uuid),
///             Property::new("Total", PropertyKind::I64),
///         ]
///     }
///
///     fn domain_event(&self) -> &DomainEvent {
///         &self.header
///     }
/// }
/// ```
pub trait Event: Serialize + DeserializeOwned + fmt::Debug + Send + Sync + 'static {
    /// Simple name; the table name in one-table-per-type layout.
    const NAME: &'static str;
    /// Stable fully qualified identity; the discriminator in shared-table layout.
    const TYPE_NAME: &'static str;

    fn properties() -> Vec<Property>;

    fn domain_event(&self) -> &DomainEvent;
}

/// Object-safe view over any [`Event`].
pub trait AnyEvent: fmt::Debug + Send + Sync + 'static {
    fn header(&self) -> &DomainEvent;

    fn event_type(&self) -> EventType;

    fn to_json(&self) -> serde_json::Result<Json>;

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

impl<E: Event> AnyEvent for E {
    fn header(&self) -> &DomainEvent {
        self.domain_event()
    }

    fn event_type(&self) -> EventType {
        EventType::of::<E>()
    }

    fn to_json(&self) -> serde_json::Result<Json> {
        serde_json::to_value(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

impl dyn AnyEvent {
    pub fn downcast_ref<E: Event>(&self) -> Option<&E> {
        self.as_any().downcast_ref::<E>()
    }

    pub fn downcast<E: Event>(self: Box<Self>) -> Option<E> {
        self.into_any().downcast::<E>().ok().map(|event| *event)
    }
}

type Decoder = fn(Json) -> serde_json::Result<Box<dyn AnyEvent>>;

fn decode_as<E: Event>(value: Json) -> serde_json::Result<Box<dyn AnyEvent>> {
    let event: E = serde_json::from_value(value)?;
    Ok(Box::new(event))
}

/// Copyable handle to an event type's descriptor.
#[derive(Clone, Copy)]
pub struct EventType {
    name: &'static str,
    type_name: &'static str,
    properties: fn() -> Vec<Property>,
    decode: Decoder,
}

impl EventType {
    pub fn of<E: Event>() -> Self {
        Self {
            name: E::NAME,
            type_name: E::TYPE_NAME,
            properties: E::properties,
            decode: decode_as::<E>,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Stored shape: base properties followed by the type's own.
    ///
    /// Own properties that repeat a base name (any case) are dropped.
    pub fn shape(&self) -> Vec<Property> {
        let mut shape = BASE_PROPERTIES.to_vec();
        for property in (self.properties)() {
            if !shape.iter().any(|p| p.matches(property.name)) {
                shape.push(property);
            }
        }
        shape
    }

    pub fn property(&self, name: &str) -> Option<Property> {
        self.shape().into_iter().find(|p| p.matches(name))
    }

    pub fn decode(&self, value: Json) -> serde_json::Result<Box<dyn AnyEvent>> {
        (self.decode)(value)
    }
}

impl PartialEq for EventType {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name
    }
}

impl Eq for EventType {}

impl fmt::Debug for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventType")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .finish()
    }
}

/// Tells the store which property carries the owning aggregate's id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMapping {
    pub aggregate_id_property: String,
    pub event_type: EventType,
}

impl EventMapping {
    pub fn new<E: Event>(aggregate_id_property: impl Into<String>) -> Self {
        Self {
            aggregate_id_property: aggregate_id_property.into(),
            event_type: EventType::of::<E>(),
        }
    }
}
