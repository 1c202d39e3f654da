//! EventStore interface tests.
//!
//! These tests verify the contract of the EventStore trait.
//! Each storage implementation should run these tests, once per layout.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;
use uuid::Uuid;

use eventshelf::predicate::PredicateError;
use eventshelf::{field, lit, DomainEvent, EventMapping, EventStore, EventStoreExt, StorageError};

use super::events::*;

/// Fixed origin so history tests control every timestamp.
pub fn origin() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 6, 1, 12, 0, 0).unwrap()
}

fn header_at(minutes: i64) -> DomainEvent {
    DomainEvent::new().at(origin() + Duration::minutes(minutes))
}

/// Save `count` orders for one customer with totals 10, 20, 30, ...
async fn save_orders<S: EventStore>(store: &S, customer_id: Uuid, count: i64) -> Vec<OrderPlaced> {
    let mut orders = Vec::new();
    for i in 1..=count {
        let order = OrderPlaced::new(customer_id, i * 10);
        store.save(&order).await.expect("save should succeed");
        orders.push(order);
    }
    orders
}

// =============================================================================
// save / find round trip
// =============================================================================

pub async fn test_save_and_find_by_id<S: EventStore>(store: &S) {
    let mut order = OrderPlaced::new(Uuid::new_v4(), 125);
    order.note = Some("leave at door".to_string());
    order.status = Status::Shipped;
    order.express = true;
    order.header = order.header.clone().on_timeline(Uuid::new_v4());

    store.save(&order).await.expect("save should succeed");

    let found = store
        .find::<OrderPlaced>(&field("Id").eq(order.header.id))
        .await
        .expect("find should succeed");

    assert_eq!(found, vec![order], "round trip should preserve every property");
}

pub async fn test_find_missing_table_is_empty<S: EventStore>(store: &S) {
    let found = store
        .find::<NeverSaved>(&lit(true))
        .await
        .expect("find on a missing table should succeed");

    assert!(found.is_empty(), "should find nothing");
}

pub async fn test_find_by_comparison<S: EventStore>(store: &S) {
    let customer = Uuid::new_v4();
    save_orders(store, customer, 3).await;

    let found = store
        .find::<OrderPlaced>(&field("CustomerId").eq(customer).and(field("Total").gt(15)))
        .await
        .expect("find should succeed");

    let mut totals: Vec<_> = found.iter().map(|o| o.total).collect();
    totals.sort();
    assert_eq!(totals, vec![20, 30]);
}

pub async fn test_find_by_enum_name<S: EventStore>(store: &S) {
    let customer = Uuid::new_v4();
    let mut shipped = OrderPlaced::new(customer, 1);
    shipped.status = Status::Shipped;
    store.save(&shipped).await.expect("save should succeed");
    store
        .save(&OrderPlaced::new(customer, 2))
        .await
        .expect("save should succeed");

    let found = store
        .find::<OrderPlaced>(&field("CustomerId").eq(customer).and(field("Status").eq("Shipped")))
        .await
        .expect("find should succeed");

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].order_id, shipped.order_id);
}

pub async fn test_find_null_and_like<S: EventStore>(store: &S) {
    let customer = Uuid::new_v4();
    let mut gift = OrderPlaced::new(customer, 1);
    gift.note = Some("gift 100% wrapped".to_string());
    let mut other = OrderPlaced::new(customer, 2);
    other.note = Some("no gift".to_string());
    let plain = OrderPlaced::new(customer, 3);
    for order in [&gift, &other, &plain] {
        store.save(order).await.expect("save should succeed");
    }

    let scoped = |expr| field("CustomerId").eq(customer).and(expr);

    let found = store
        .find::<OrderPlaced>(&scoped(field("Note").is_null()))
        .await
        .expect("find should succeed");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].order_id, plain.order_id);

    let found = store
        .find::<OrderPlaced>(&scoped(field("Note").starts_with("gift")))
        .await
        .expect("find should succeed");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].order_id, gift.order_id);

    let found = store
        .find::<OrderPlaced>(&scoped(field("Note").contains("100%")))
        .await
        .expect("find should succeed");
    assert_eq!(found.len(), 1, "% in the pattern should match literally");

    let found = store
        .find::<OrderPlaced>(&scoped(field("Note").ends_with("gift")))
        .await
        .expect("find should succeed");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].order_id, other.order_id);
}

pub async fn test_find_membership<S: EventStore>(store: &S) {
    let customer = Uuid::new_v4();
    save_orders(store, customer, 3).await;

    let found = store
        .find::<OrderPlaced>(&field("CustomerId").eq(customer).and(field("Total").is_in(vec![10, 30])))
        .await
        .expect("find should succeed");
    assert_eq!(found.len(), 2);

    let found = store
        .find::<OrderPlaced>(
            &field("CustomerId")
                .eq(customer)
                .and(field("Total").is_in(Vec::<i64>::new())),
        )
        .await
        .expect("find should succeed");
    assert!(found.is_empty(), "empty IN should match nothing");
}

pub async fn test_find_bool_member<S: EventStore>(store: &S) {
    let customer = Uuid::new_v4();
    let mut express = OrderPlaced::new(customer, 1);
    express.express = true;
    store.save(&express).await.expect("save should succeed");
    store
        .save(&OrderPlaced::new(customer, 2))
        .await
        .expect("save should succeed");

    let found = store
        .find::<OrderPlaced>(&field("CustomerId").eq(customer).and(field("Express")))
        .await
        .expect("find should succeed");

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].order_id, express.order_id);
}

pub async fn test_find_json_member<S: EventStore>(store: &S) {
    let customer = Uuid::new_v4();
    let mut special = OrderPlaced::new(customer, 1);
    special.lines[0].sku = "Z-9".to_string();
    store.save(&special).await.expect("save should succeed");
    store
        .save(&OrderPlaced::new(customer, 2))
        .await
        .expect("save should succeed");

    let found = store
        .find::<OrderPlaced>(&field("CustomerId").eq(customer).and(field("Lines.0.Sku").eq("Z-9")))
        .await
        .expect("find should succeed");

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].order_id, special.order_id);
}

pub async fn test_find_unknown_property_fails<S: EventStore>(store: &S) {
    store
        .save(&OrderPlaced::new(Uuid::new_v4(), 1))
        .await
        .expect("save should succeed");

    let result = store.find::<OrderPlaced>(&field("Bogus").eq(1)).await;

    assert!(
        matches!(
            result,
            Err(StorageError::Predicate(PredicateError::UnknownProperty { .. }))
        ),
        "unknown property should be rejected, got {:?}",
        result
    );
}

pub async fn test_out_of_range_enum_round_trips<S: EventStore>(store: &S) {
    let known = StatusReported {
        header: DomainEvent::new(),
        order_id: Uuid::new_v4(),
        status: json!("Cancelled"),
    };
    let unknown = StatusReported {
        header: DomainEvent::new(),
        order_id: known.order_id,
        status: json!(7),
    };
    store.save(&known).await.expect("save should succeed");
    store.save(&unknown).await.expect("save should succeed");

    let mut found = store
        .find::<StatusReported>(&field("OrderId").eq(known.order_id))
        .await
        .expect("find should succeed");
    found.sort_by_key(|e| e.header.id == unknown.header.id);

    assert_eq!(found.len(), 2);
    assert_eq!(found[0].status, json!("Cancelled"));
    assert_eq!(found[1].status, json!(7), "unknown ordinal should pass through");
}

pub async fn test_find_by_timestamp_property<S: EventStore>(store: &S) {
    let owner_id = Uuid::new_v4();
    // Whole seconds serialize without a fraction.
    let due = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let reminder = |due: DateTime<Utc>, until: DateTime<Utc>| Reminder {
        header: DomainEvent::new(),
        owner_id,
        due,
        window: ReminderWindow { until },
    };
    let on_time = reminder(due, due + Duration::days(1));
    let late = reminder(due + Duration::milliseconds(1500), due + Duration::days(2));
    store.save(&on_time).await.expect("save should succeed");
    store.save(&late).await.expect("save should succeed");

    let ids = |found: Vec<Reminder>| -> Vec<Uuid> {
        let mut ids: Vec<_> = found.iter().map(|r| r.header.id).collect();
        ids.sort();
        ids
    };
    let both = ids(vec![on_time.clone(), late.clone()]);
    let scoped = |expr| field("OwnerId").eq(owner_id).and(expr);

    let found = store
        .find::<Reminder>(&scoped(field("Due").eq(due)))
        .await
        .expect("find should succeed");
    assert_eq!(found, vec![on_time.clone()], "saved timestamp should match itself");

    let found = store
        .find::<Reminder>(&scoped(field("Due").le(due + Duration::seconds(1))))
        .await
        .expect("find should succeed");
    assert_eq!(ids(found), vec![on_time.header.id]);

    let found = store
        .find::<Reminder>(&scoped(field("Due").gt(due)))
        .await
        .expect("find should succeed");
    assert_eq!(ids(found), vec![late.header.id]);

    let found = store
        .find::<Reminder>(&scoped(field("Due").is_in(vec![due, late.due])))
        .await
        .expect("find should succeed");
    assert_eq!(ids(found), both);

    let found = store
        .find::<Reminder>(&scoped(field("Window.Until").ge(due + Duration::days(2))))
        .await
        .expect("find should succeed");
    assert_eq!(ids(found), vec![late.header.id]);

    let found = store
        .find::<Reminder>(&scoped(field("Window.Until").eq(due + Duration::days(1))))
        .await
        .expect("find should succeed");
    assert_eq!(ids(found), vec![on_time.header.id]);
}

pub async fn test_concurrent_first_saves<S: EventStore>(store: &S) {
    let account = Uuid::new_v4();
    let transfer = |amount| TransferMade {
        header: DomainEvent::new(),
        from_account: account,
        to_account: Uuid::new_v4(),
        amount,
    };
    let (a, b, c, d) = (transfer(1), transfer(2), transfer(3), transfer(4));

    let (ra, rb, rc, rd) = tokio::join!(store.save(&a), store.save(&b), store.save(&c), store.save(&d));
    for result in [ra, rb, rc, rd] {
        result.expect("concurrent saves should all succeed");
    }

    let found = store
        .find::<TransferMade>(&field("FromAccount").eq(account))
        .await
        .expect("find should succeed");
    assert_eq!(found.len(), 4);
}

// =============================================================================
// retrieve_events
// =============================================================================

pub async fn test_retrieve_history_across_types<S: EventStore>(store: &S) {
    let order_id = Uuid::new_v4();

    let mut placed = OrderPlaced::new(Uuid::new_v4(), 50);
    placed.header = header_at(1);
    placed.order_id = order_id;
    let shipped = OrderShipped {
        header: header_at(2),
        order_id,
        carrier: "post".to_string(),
    };
    let too_late = OrderShipped {
        header: header_at(10),
        order_id,
        carrier: "late".to_string(),
    };
    let unrelated = OrderShipped {
        header: header_at(2),
        order_id: Uuid::new_v4(),
        carrier: "other".to_string(),
    };

    // Saved out of order; history comes back sorted by timestamp.
    store.save(&shipped).await.expect("save should succeed");
    store.save(&placed).await.expect("save should succeed");
    store.save(&too_late).await.expect("save should succeed");
    store.save(&unrelated).await.expect("save should succeed");

    let mappings = [
        EventMapping::new::<OrderPlaced>("OrderId"),
        EventMapping::new::<OrderShipped>("OrderId"),
    ];
    let history = store
        .retrieve_events(order_id, origin() + Duration::minutes(5), &mappings, None)
        .await
        .expect("retrieve should succeed");

    assert_eq!(history.len(), 2);
    assert_eq!(history[0].downcast_ref::<OrderPlaced>(), Some(&placed));
    assert_eq!(history[1].downcast_ref::<OrderShipped>(), Some(&shipped));
}

pub async fn test_retrieve_point_in_time_is_inclusive<S: EventStore>(store: &S) {
    let order_id = Uuid::new_v4();
    let shipped = OrderShipped {
        header: header_at(3),
        order_id,
        carrier: "post".to_string(),
    };
    store.save(&shipped).await.expect("save should succeed");

    let mappings = [EventMapping::new::<OrderShipped>("OrderId")];
    let history = store
        .retrieve_events(order_id, shipped.header.time_stamp, &mappings, None)
        .await
        .expect("retrieve should succeed");

    assert_eq!(history.len(), 1);
}

pub async fn test_retrieve_timelines<S: EventStore>(store: &S) {
    let order_id = Uuid::new_v4();
    let (first, second) = (Uuid::new_v4(), Uuid::new_v4());
    let shipment = |minutes, timeline: Option<Uuid>, carrier: &str| {
        let mut header = header_at(minutes);
        header.timeline_id = timeline;
        OrderShipped {
            header,
            order_id,
            carrier: carrier.to_string(),
        }
    };

    for event in [
        shipment(1, None, "main"),
        shipment(2, Some(first), "first"),
        shipment(3, Some(second), "second"),
    ] {
        store.save(&event).await.expect("save should succeed");
    }

    let mappings = [EventMapping::new::<OrderShipped>("OrderId")];
    let carriers = |history: Vec<Box<dyn eventshelf::AnyEvent>>| -> Vec<String> {
        history
            .iter()
            .filter_map(|e| e.downcast_ref::<OrderShipped>())
            .map(|e| e.carrier.clone())
            .collect()
    };

    let main = store
        .retrieve_events(order_id, origin() + Duration::minutes(10), &mappings, None)
        .await
        .expect("retrieve should succeed");
    assert_eq!(carriers(main), vec!["main"]);

    let branched = store
        .retrieve_events(order_id, origin() + Duration::minutes(10), &mappings, Some(first))
        .await
        .expect("retrieve should succeed");
    assert_eq!(carriers(branched), vec!["main", "first"]);
}

pub async fn test_retrieve_by_several_properties<S: EventStore>(store: &S) {
    let account = Uuid::new_v4();
    let transfer = |minutes, from, to| TransferMade {
        header: header_at(minutes),
        from_account: from,
        to_account: to,
        amount: 5,
    };
    let outgoing = transfer(1, account, Uuid::new_v4());
    let incoming = transfer(2, Uuid::new_v4(), account);
    let unrelated = transfer(3, Uuid::new_v4(), Uuid::new_v4());
    for event in [&outgoing, &incoming, &unrelated] {
        store.save(event).await.expect("save should succeed");
    }

    let mappings = [
        EventMapping::new::<TransferMade>("FromAccount"),
        EventMapping::new::<TransferMade>("ToAccount"),
    ];
    let history = store
        .retrieve_events(account, origin() + Duration::minutes(10), &mappings, None)
        .await
        .expect("retrieve should succeed");

    let ids: Vec<_> = history.iter().map(|e| e.header().id).collect();
    assert_eq!(ids, vec![outgoing.header.id, incoming.header.id]);
}

pub async fn test_retrieve_without_tables_is_empty<S: EventStore>(store: &S) {
    let mappings = [EventMapping::new::<NeverSaved>("OwnerId")];
    let history = store
        .retrieve_events(Uuid::new_v4(), Utc::now(), &mappings, None)
        .await
        .expect("retrieve should succeed");

    assert!(history.is_empty());

    let history = store
        .retrieve_events(Uuid::new_v4(), Utc::now(), &[], None)
        .await
        .expect("retrieve without mappings should succeed");
    assert!(history.is_empty());
}

// =============================================================================
// Schema evolution (one table per type)
// =============================================================================

pub async fn test_migration_adds_columns<S: EventStore>(store: &S) {
    let account_id = Uuid::new_v4();
    let old = AccountOpenedV1 {
        header: DomainEvent::new(),
        account_id,
        owner: "ada".to_string(),
    };
    store.save(&old).await.expect("save should succeed");

    let new = AccountOpenedV2 {
        header: DomainEvent::new(),
        account_id,
        owner: "grace".to_string(),
        tier: 2,
        tags: vec!["vip".to_string()],
    };
    store
        .save(&new)
        .await
        .expect("save after the type gained properties should succeed");

    let mut found = store
        .find::<AccountOpenedV2>(&field("AccountId").eq(account_id))
        .await
        .expect("find should succeed");
    found.sort_by(|a, b| a.owner.cmp(&b.owner));

    assert_eq!(found.len(), 2);
    assert_eq!(found[0].owner, "ada");
    assert_eq!(found[0].tier, 0, "rows older than a column read as blank");
    assert!(found[0].tags.is_empty());
    assert_eq!(found[1], new);
}

// =============================================================================
// Test runner macro
// =============================================================================

/// Run all EventStore interface tests against a store implementation.
///
/// `$options` is the store's `StoreOptions`; schema evolution only runs in
/// one-table-per-type layout.
#[macro_export]
macro_rules! run_event_store_tests {
    ($store:expr, $options:expr) => {
        use $crate::storage::event_store_tests::*;

        $crate::storage::events::register_fixtures();

        // save / find tests
        test_save_and_find_by_id($store).await;
        println!("  test_save_and_find_by_id: PASSED");

        test_find_missing_table_is_empty($store).await;
        println!("  test_find_missing_table_is_empty: PASSED");

        test_find_by_comparison($store).await;
        println!("  test_find_by_comparison: PASSED");

        test_find_by_enum_name($store).await;
        println!("  test_find_by_enum_name: PASSED");

        test_find_null_and_like($store).await;
        println!("  test_find_null_and_like: PASSED");

        test_find_membership($store).await;
        println!("  test_find_membership: PASSED");

        test_find_bool_member($store).await;
        println!("  test_find_bool_member: PASSED");

        test_find_json_member($store).await;
        println!("  test_find_json_member: PASSED");

        test_find_unknown_property_fails($store).await;
        println!("  test_find_unknown_property_fails: PASSED");

        test_out_of_range_enum_round_trips($store).await;
        println!("  test_out_of_range_enum_round_trips: PASSED");

        test_find_by_timestamp_property($store).await;
        println!("  test_find_by_timestamp_property: PASSED");

        test_concurrent_first_saves($store).await;
        println!("  test_concurrent_first_saves: PASSED");

        // retrieve_events tests
        test_retrieve_history_across_types($store).await;
        println!("  test_retrieve_history_across_types: PASSED");

        test_retrieve_point_in_time_is_inclusive($store).await;
        println!("  test_retrieve_point_in_time_is_inclusive: PASSED");

        test_retrieve_timelines($store).await;
        println!("  test_retrieve_timelines: PASSED");

        test_retrieve_by_several_properties($store).await;
        println!("  test_retrieve_by_several_properties: PASSED");

        test_retrieve_without_tables_is_empty($store).await;
        println!("  test_retrieve_without_tables_is_empty: PASSED");

        // schema evolution
        if !$options.single_table && $options.auto_migrate {
            test_migration_adds_columns($store).await;
            println!("  test_migration_adds_columns: PASSED");
        }
    };
}
