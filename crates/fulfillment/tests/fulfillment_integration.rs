//! Integration tests for order placement across both replicas.

use std::sync::Arc;

use chrono::NaiveDate;
use common::{ItemId, OrderId};
use domain::{Item, LineItem, Money, OrderPatch, OrderRequest};
use fulfillment::{
    ConsistencyGuard, FulfillmentEngine, FulfillmentError, OperationId, Replicas, Reservation,
};
use replica_store::{InMemoryReplica, Replica, ReplicaStore, ReplicaStoreExt};
use uuid::Uuid;

type TestEngine = FulfillmentEngine<InMemoryReplica, InMemoryReplica>;

struct TestHarness {
    engine: TestEngine,
    relational: InMemoryReplica,
    document: InMemoryReplica,
}

impl TestHarness {
    fn new() -> Self {
        let relational = InMemoryReplica::relational();
        let document = InMemoryReplica::document();
        let engine = FulfillmentEngine::new(relational.clone(), document.clone());
        Self {
            engine,
            relational,
            document,
        }
    }

    async fn stock_item(&self, name: &str, cents: i64, quantity: u32) -> ItemId {
        let item = Item {
            id: ItemId::new(),
            name: name.to_string(),
            kind: "part".to_string(),
            unit_cost: Money::from_cents(cents),
            quantity,
            alert_threshold: 1,
        };
        self.relational.seed_item(item.clone()).await;
        self.document.seed_item(item.clone()).await;
        item.id
    }

    async fn quantities(&self, item_id: ItemId) -> (u32, u32) {
        (
            self.relational
                .read_stock(item_id)
                .await
                .unwrap()
                .unwrap()
                .quantity,
            self.document
                .read_stock(item_id)
                .await
                .unwrap()
                .unwrap()
                .quantity,
        )
    }

    async fn order_counts(&self) -> (usize, usize) {
        (
            self.relational.order_count().await,
            self.document.order_count().await,
        )
    }
}

fn request(lines: &[(ItemId, u32)]) -> OrderRequest {
    let ordered = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
    let delivered = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
    OrderRequest::new(
        lines
            .iter()
            .map(|&(item_id, quantity)| LineItem::new(item_id, quantity))
            .collect(),
        ordered,
        delivered,
    )
}

#[tokio::test]
async fn test_guard_returns_agreed_quantity_or_divergence() {
    let h = TestHarness::new();
    let item_id = h.stock_item("Brake pad", 800, 5).await;
    let guard = ConsistencyGuard::new(Replicas::new(h.relational.clone(), h.document.clone()));

    assert_eq!(guard.check(item_id).await.unwrap().quantity, 5);

    h.document.force_quantity(item_id, 7).await;
    assert!(matches!(
        guard.check(item_id).await,
        Err(FulfillmentError::ReplicaDivergence { .. })
    ));
}

#[tokio::test]
async fn test_two_line_order_totals_and_reaches_both_replicas() {
    let h = TestHarness::new();
    let a = h.stock_item("Tube 700c", 1000, 10).await;
    let b = h.stock_item("Valve cap", 500, 4).await;

    let order = h.engine.place_order(request(&[(a, 2), (b, 1)])).await.unwrap();

    assert_eq!(order.total_amount, Money::from_cents(2500));
    assert_eq!(order.total_amount.to_string(), "25.00");
    assert_eq!(order.status, "created");
    assert_eq!(h.relational.read_order(order.id).await.unwrap(), Some(order.clone()));
    assert_eq!(h.document.read_order(order.id).await.unwrap(), Some(order.clone()));
    assert_eq!(h.quantities(a).await, (8, 8));
    assert_eq!(h.quantities(b).await, (3, 3));
    assert!(h.engine.pending_replications().await.is_empty());
}

#[tokio::test]
async fn test_insufficient_stock_writes_nothing() {
    let h = TestHarness::new();
    let item_id = h.stock_item("Derailleur", 6000, 5).await;

    let err = h
        .engine
        .place_order(request(&[(item_id, 10)]))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        FulfillmentError::InsufficientStock {
            available: 5,
            requested: 10,
            ..
        }
    ));
    assert_eq!(h.quantities(item_id).await, (5, 5));
    assert_eq!(h.order_counts().await, (0, 0));
}

#[tokio::test]
async fn test_second_line_failure_restores_first_line() {
    let h = TestHarness::new();
    let a = h.stock_item("Cable", 300, 6).await;
    let b = h.stock_item("Housing", 400, 1).await;

    let err = h
        .engine
        .place_order(request(&[(a, 2), (b, 5)]))
        .await
        .unwrap_err();

    assert!(matches!(err, FulfillmentError::InsufficientStock { .. }));
    assert_eq!(h.quantities(a).await, (6, 6));
    assert_eq!(h.quantities(b).await, (1, 1));
    assert_eq!(h.order_counts().await, (0, 0));
}

#[tokio::test]
async fn test_unknown_item_restores_earlier_lines() {
    let h = TestHarness::new();
    let a = h.stock_item("Cassette", 4200, 3).await;
    let missing = ItemId::new();

    let err = h
        .engine
        .place_order(request(&[(a, 1), (missing, 1)]))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        FulfillmentError::ItemNotFound {
            replica: Replica::Relational,
            ..
        }
    ));
    assert_eq!(h.quantities(a).await, (3, 3));
}

#[tokio::test]
async fn test_diverged_item_blocks_the_order() {
    let h = TestHarness::new();
    let a = h.stock_item("Crank", 9000, 5).await;
    let b = h.stock_item("Chainring", 3500, 5).await;
    h.relational.force_quantity(b, 4).await;

    let err = h
        .engine
        .place_order(request(&[(a, 1), (b, 1)]))
        .await
        .unwrap_err();

    assert!(matches!(err, FulfillmentError::ReplicaDivergence { .. }));
    assert_eq!(h.quantities(a).await, (5, 5));
    assert_eq!(h.quantities(b).await, (4, 5));
}

#[tokio::test]
async fn test_empty_order_is_invalid() {
    let h = TestHarness::new();
    let err = h.engine.place_order(request(&[])).await.unwrap_err();
    assert!(matches!(err, FulfillmentError::Invalid(_)));
}

#[tokio::test]
async fn test_partial_reservation_on_later_line_unwinds_everything() {
    let h = TestHarness::new();
    let a = h.stock_item("Rotor", 2500, 4).await;
    let b = h.stock_item("Caliper", 7000, 4).await;
    // First line writes both replicas, second line's document write fails.
    h.document.fail_quantity_writes_after(1).await;

    let err = h
        .engine
        .place_order(request(&[(a, 1), (b, 2)]))
        .await
        .unwrap_err();

    // Restoring line one also needs a document write, which still fails.
    match &err {
        FulfillmentError::RollbackFailed { cause, failures } => {
            assert!(matches!(
                **cause,
                FulfillmentError::PartialReservationFailure { restored: true, .. }
            ));
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].item_id, a);
            assert_eq!(failures[0].replica, Replica::Document);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(h.quantities(a).await, (4, 3));
    assert_eq!(h.quantities(b).await, (4, 4));
    assert_eq!(h.order_counts().await, (0, 0));
}

#[tokio::test]
async fn test_partial_reservation_on_first_line_reports_directly() {
    let h = TestHarness::new();
    let a = h.stock_item("Hub", 12000, 2).await;
    h.document.fail_quantity_writes_after(0).await;

    let err = h.engine.place_order(request(&[(a, 1)])).await.unwrap_err();

    assert!(matches!(
        err,
        FulfillmentError::PartialReservationFailure {
            failed_replica: Replica::Document,
            restored: true,
            ..
        }
    ));
    assert_eq!(h.quantities(a).await, (2, 2));
}

#[tokio::test]
async fn test_relational_order_write_failure_restores_stock() {
    let h = TestHarness::new();
    let a = h.stock_item("Headset", 5500, 3).await;
    h.relational.set_fail_on_insert_order(true).await;

    let err = h.engine.place_order(request(&[(a, 2)])).await.unwrap_err();

    assert!(matches!(
        err,
        FulfillmentError::OrderPersistFailure {
            replica: Replica::Relational,
            ..
        }
    ));
    assert_eq!(h.quantities(a).await, (3, 3));
    assert_eq!(h.order_counts().await, (0, 0));
}

#[tokio::test]
async fn test_document_order_write_failure_is_replayed() {
    let h = TestHarness::new();
    let a = h.stock_item("Stem", 4000, 3).await;
    h.document.set_fail_on_insert_order(true).await;

    let order = h.engine.place_order(request(&[(a, 1)])).await.unwrap();

    assert_eq!(h.order_counts().await, (1, 0));
    assert_eq!(h.quantities(a).await, (2, 2));
    let pending = h.engine.pending_replications().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].order_id, order.id);

    // Still down: the entry stays and counts the attempt.
    let report = h.engine.replay_pending_replications().await.unwrap();
    assert_eq!(report.still_pending, 1);
    assert_eq!(h.engine.pending_replications().await[0].attempts, 1);

    h.document.set_fail_on_insert_order(false).await;
    let report = h.engine.replay_pending_replications().await.unwrap();

    assert_eq!(report.replicated, 1);
    assert_eq!(h.document.read_order(order.id).await.unwrap(), Some(order));
    assert!(h.engine.pending_replications().await.is_empty());
}

#[tokio::test]
async fn test_replay_carries_later_status_updates() {
    let h = TestHarness::new();
    let a = h.stock_item("Seatpost", 3000, 3).await;
    h.document.set_fail_on_insert_order(true).await;
    let order = h.engine.place_order(request(&[(a, 1)])).await.unwrap();

    let updated = h
        .engine
        .update_order(order.id, OrderPatch::status("shipped"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.status, "shipped");

    h.document.set_fail_on_insert_order(false).await;
    h.engine.replay_pending_replications().await.unwrap();

    let copy = h.document.read_order(order.id).await.unwrap().unwrap();
    assert_eq!(copy.status, "shipped");
}

#[tokio::test]
async fn test_replay_drops_deleted_orders() {
    let h = TestHarness::new();
    let a = h.stock_item("Bar tape", 1500, 3).await;
    h.document.set_fail_on_insert_order(true).await;
    let order = h.engine.place_order(request(&[(a, 1)])).await.unwrap();

    // Removing the relational row directly leaves the queue entry behind.
    h.relational.delete_order(order.id).await.unwrap();
    let report = h.engine.replay_pending_replications().await.unwrap();

    assert_eq!(report.deleted, 1);
    assert!(h.engine.pending_replications().await.is_empty());
}

#[tokio::test]
async fn test_compensating_twice_never_exceeds_pre_reservation_quantity() {
    let h = TestHarness::new();
    let item_id = h.stock_item("Tire", 3900, 5).await;
    h.relational.force_quantity(item_id, 2).await;
    h.document.force_quantity(item_id, 2).await;
    let reservation = Reservation {
        operation_id: OperationId::new(Uuid::new_v4(), 0),
        item_id,
        quantity: 3,
        unit_cost: Money::from_cents(3900),
        previous_quantity: 5,
    };

    let first = h.engine.compensator().compensate(&[reservation]).await;
    let second = h.engine.compensator().compensate(&[reservation]).await;

    assert!(first.is_clean());
    assert!(second.is_clean());
    assert_eq!(h.quantities(item_id).await, (5, 5));
}

#[tokio::test]
async fn test_order_updates_and_deletes_never_touch_stock() {
    let h = TestHarness::new();
    let a = h.stock_item("Pump", 2000, 5).await;
    let order = h.engine.place_order(request(&[(a, 2)])).await.unwrap();

    let updated = h
        .engine
        .update_order(order.id, OrderPatch::status("delivered"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        h.document.read_order(order.id).await.unwrap().unwrap(),
        updated
    );

    assert!(h.engine.delete_order(order.id).await.unwrap());
    assert_eq!(h.order_counts().await, (0, 0));
    assert_eq!(h.quantities(a).await, (3, 3));

    assert!(h.engine.get_order(order.id).await.unwrap().is_none());
    assert!(
        h.engine
            .update_order(OrderId::new(), OrderPatch::status("x"))
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_failed_document_delete_is_queued_and_replayed() {
    let h = TestHarness::new();
    let a = h.stock_item("Kickstand", 1800, 4).await;
    let order = h.engine.place_order(request(&[(a, 1)])).await.unwrap();
    h.document.set_unavailable(true).await;

    assert!(h.engine.delete_order(order.id).await.unwrap());
    assert_eq!(h.relational.order_count().await, 0);
    let pending = h.engine.pending_replications().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].order_id, order.id);

    h.document.set_unavailable(false).await;
    let report = h.engine.replay_pending_replications().await.unwrap();

    assert_eq!(report.deleted, 1);
    assert_eq!(h.order_counts().await, (0, 0));
    assert!(h.engine.pending_replications().await.is_empty());
}

#[tokio::test]
async fn test_delete_of_unknown_order_with_document_down_is_an_error() {
    let h = TestHarness::new();
    h.document.set_unavailable(true).await;

    let err = h.engine.delete_order(OrderId::new()).await.unwrap_err();

    assert!(matches!(err, FulfillmentError::StoreUnavailable(_)));
    assert!(h.engine.pending_replications().await.is_empty());
}

#[tokio::test]
async fn test_catalog_and_engine_share_replicas() {
    let h = TestHarness::new();
    let catalog = h.engine.catalog();
    let item = catalog
        .create_item(domain::NewItem::new(
            "Light",
            "accessory",
            Money::from_cents(2999),
            2,
            1,
        ))
        .await
        .unwrap();

    let order = h.engine.place_order(request(&[(item.id, 1)])).await.unwrap();

    assert_eq!(order.total_amount, Money::from_cents(2999));
    let low = catalog.low_stock_items().await.unwrap();
    assert_eq!(low.len(), 1);
    assert_eq!(low[0].quantity, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_orders_on_one_item_never_oversell() {
    let h = TestHarness::new();
    let item_id = h.stock_item("Last wheelset", 45000, 1).await;
    let engine = Arc::new(h.engine);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            engine.place_order(request(&[(item_id, 1)])).await
        }));
    }

    let mut placed = 0;
    let mut refused = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => placed += 1,
            Err(FulfillmentError::InsufficientStock { .. }) => refused += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(placed, 1);
    assert_eq!(refused, 7);
    let relational = h.relational.read_stock(item_id).await.unwrap().unwrap();
    let document = h.document.read_stock(item_id).await.unwrap().unwrap();
    assert_eq!((relational.quantity, document.quantity), (0, 0));
    assert_eq!(h.relational.order_count().await, 1);
}
