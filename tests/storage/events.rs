//! Event types used by the storage contract tests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use uuid::Uuid;

use eventshelf::{DomainEvent, Event, EventRegistry, Property, PropertyKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Placed,
    Shipped,
    Cancelled,
}

pub const STATUS: &[&str] = &["Placed", "Shipped", "Cancelled"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Line {
    pub sku: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OrderPlaced {
    #[serde(flatten)]
    pub header: DomainEvent,
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub total: i64,
    pub note: Option<String>,
    pub status: Status,
    #[serde(default)]
    pub lines: Vec<Line>,
    pub priority: u8,
    pub weight: f64,
    pub express: bool,
}

impl OrderPlaced {
    pub fn new(customer_id: Uuid, total: i64) -> Self {
        Self {
            header: DomainEvent::new(),
            order_id: Uuid::new_v4(),
            customer_id,
            total,
            note: None,
            status: Status::Placed,
            lines: vec![Line {
                sku: "A-1".to_string(),
                quantity: 2,
            }],
            priority: 3,
            weight: 1.5,
            express: false,
        }
    }
}

impl Event for OrderPlaced {
    const NAME: &'static str = "OrderPlaced";
    const TYPE_NAME: &'static str = "eventshelf.contract.OrderPlaced";

    fn properties() -> Vec<Property> {
        vec![
            Property::new("OrderId", PropertyKind::Uuid),
            Property::new("CustomerId", PropertyKind::Uuid),
            Property::new("Total", PropertyKind::I64),
            Property::optional("Note", PropertyKind::String),
            Property::new("Status", PropertyKind::Enum(STATUS)),
            Property::new("Lines", PropertyKind::Json),
            Property::new("Priority", PropertyKind::U8),
            Property::new("Weight", PropertyKind::F64),
            Property::new("Express", PropertyKind::Bool),
        ]
    }

    fn domain_event(&self) -> &DomainEvent {
        &self.header
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OrderShipped {
    #[serde(flatten)]
    pub header: DomainEvent,
    pub order_id: Uuid,
    pub carrier: String,
}

impl Event for OrderShipped {
    const NAME: &'static str = "OrderShipped";
    const TYPE_NAME: &'static str = "eventshelf.contract.OrderShipped";

    fn properties() -> Vec<Property> {
        vec![
            Property::new("OrderId", PropertyKind::Uuid),
            Property::new("Carrier", PropertyKind::String),
        ]
    }

    fn domain_event(&self) -> &DomainEvent {
        &self.header
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TransferMade {
    #[serde(flatten)]
    pub header: DomainEvent,
    pub from_account: Uuid,
    pub to_account: Uuid,
    pub amount: i64,
}

impl Event for TransferMade {
    const NAME: &'static str = "TransferMade";
    const TYPE_NAME: &'static str = "eventshelf.contract.TransferMade";

    fn properties() -> Vec<Property> {
        vec![
            Property::new("FromAccount", PropertyKind::Uuid),
            Property::new("ToAccount", PropertyKind::Uuid),
            Property::new("Amount", PropertyKind::I64),
        ]
    }

    fn domain_event(&self) -> &DomainEvent {
        &self.header
    }
}

/// First shape of an evolving event; shares its table with [`AccountOpenedV2`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AccountOpenedV1 {
    #[serde(flatten)]
    pub header: DomainEvent,
    pub account_id: Uuid,
    pub owner: String,
}

impl Event for AccountOpenedV1 {
    const NAME: &'static str = "AccountOpened";
    const TYPE_NAME: &'static str = "eventshelf.contract.AccountOpenedV1";

    fn properties() -> Vec<Property> {
        vec![
            Property::new("AccountId", PropertyKind::Uuid),
            Property::new("Owner", PropertyKind::String),
        ]
    }

    fn domain_event(&self) -> &DomainEvent {
        &self.header
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AccountOpenedV2 {
    #[serde(flatten)]
    pub header: DomainEvent,
    pub account_id: Uuid,
    pub owner: String,
    pub tier: i32,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Event for AccountOpenedV2 {
    const NAME: &'static str = "AccountOpened";
    const TYPE_NAME: &'static str = "eventshelf.contract.AccountOpenedV2";

    fn properties() -> Vec<Property> {
        vec![
            Property::new("AccountId", PropertyKind::Uuid),
            Property::new("Owner", PropertyKind::String),
            Property::new("Tier", PropertyKind::I32),
            Property::new("Tags", PropertyKind::Json),
        ]
    }

    fn domain_event(&self) -> &DomainEvent {
        &self.header
    }
}

/// Enum-typed property kept as raw JSON, so ordinals without a variant
/// survive the round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatusReported {
    #[serde(flatten)]
    pub header: DomainEvent,
    pub order_id: Uuid,
    pub status: Json,
}

impl Event for StatusReported {
    const NAME: &'static str = "StatusReported";
    const TYPE_NAME: &'static str = "eventshelf.contract.StatusReported";

    fn properties() -> Vec<Property> {
        vec![
            Property::new("OrderId", PropertyKind::Uuid),
            Property::new("Status", PropertyKind::Enum(STATUS)),
        ]
    }

    fn domain_event(&self) -> &DomainEvent {
        &self.header
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReminderWindow {
    pub until: DateTime<Utc>,
}

/// Timestamps outside the header, both as a property and nested in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Reminder {
    #[serde(flatten)]
    pub header: DomainEvent,
    pub owner_id: Uuid,
    pub due: DateTime<Utc>,
    pub window: ReminderWindow,
}

impl Event for Reminder {
    const NAME: &'static str = "Reminder";
    const TYPE_NAME: &'static str = "eventshelf.contract.Reminder";

    fn properties() -> Vec<Property> {
        vec![
            Property::new("OwnerId", PropertyKind::Uuid),
            Property::new("Due", PropertyKind::DateTime),
            Property::new("Window", PropertyKind::Json),
        ]
    }

    fn domain_event(&self) -> &DomainEvent {
        &self.header
    }
}

/// Never saved by any test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NeverSaved {
    #[serde(flatten)]
    pub header: DomainEvent,
    pub owner_id: Uuid,
}

impl Event for NeverSaved {
    const NAME: &'static str = "NeverSaved";
    const TYPE_NAME: &'static str = "eventshelf.contract.NeverSaved";

    fn properties() -> Vec<Property> {
        vec![Property::new("OwnerId", PropertyKind::Uuid)]
    }

    fn domain_event(&self) -> &DomainEvent {
        &self.header
    }
}

/// Kept out of the registry on purpose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Unregistered {
    #[serde(flatten)]
    pub header: DomainEvent,
}

impl Event for Unregistered {
    const NAME: &'static str = "Unregistered";
    const TYPE_NAME: &'static str = "eventshelf.contract.Unregistered";

    fn properties() -> Vec<Property> {
        Vec::new()
    }

    fn domain_event(&self) -> &DomainEvent {
        &self.header
    }
}

/// Register every fixture type except [`Unregistered`].
pub fn register_fixtures() {
    let registry = EventRegistry::global();
    registry.register::<OrderPlaced>();
    registry.register::<OrderShipped>();
    registry.register::<TransferMade>();
    registry.register::<AccountOpenedV1>();
    registry.register::<AccountOpenedV2>();
    registry.register::<StatusReported>();
    registry.register::<Reminder>();
    registry.register::<NeverSaved>();
}
