//! Replay of the replication outbox racing order edits and deletes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use common::{ItemId, OrderId};
use domain::{
    Item, ItemFilter, ItemPatch, LineItem, Money, NewItem, NewOrder, Order, OrderFilter,
    OrderPatch, OrderRequest, Page,
};
use fulfillment::FulfillmentEngine;
use replica_store::{InMemoryReplica, Replica, ReplicaStore, Result};
use tokio::sync::Notify;

/// Document replica whose next order insert can be held until released.
#[derive(Clone)]
struct PausingDocument {
    inner: InMemoryReplica,
    gate: Arc<Gate>,
}

#[derive(Default)]
struct Gate {
    armed: AtomicBool,
    reached: Notify,
    release: Notify,
}

impl PausingDocument {
    fn new() -> Self {
        Self {
            inner: InMemoryReplica::document(),
            gate: Arc::new(Gate::default()),
        }
    }

    /// Holds the next `insert_order` until `resume` is called.
    fn pause_next_insert(&self) {
        self.gate.armed.store(true, Ordering::SeqCst);
    }

    async fn wait_until_paused(&self) {
        self.gate.reached.notified().await;
    }

    fn resume(&self) {
        self.gate.release.notify_one();
    }
}

#[async_trait]
impl ReplicaStore for PausingDocument {
    fn replica(&self) -> Replica {
        self.inner.replica()
    }

    async fn insert_item(&self, item: NewItem) -> Result<Item> {
        self.inner.insert_item(item).await
    }

    async fn read_item(&self, id: ItemId) -> Result<Option<Item>> {
        self.inner.read_item(id).await
    }

    async fn find_items(&self, filter: &ItemFilter, page: Page) -> Result<Vec<Item>> {
        self.inner.find_items(filter, page).await
    }

    async fn update_item(&self, id: ItemId, patch: &ItemPatch) -> Result<Option<Item>> {
        self.inner.update_item(id, patch).await
    }

    async fn write_quantity(&self, id: ItemId, quantity: u32) -> Result<Option<Item>> {
        self.inner.write_quantity(id, quantity).await
    }

    async fn delete_item(&self, id: ItemId) -> Result<bool> {
        self.inner.delete_item(id).await
    }

    async fn insert_order(&self, order: NewOrder) -> Result<Order> {
        if self.gate.armed.swap(false, Ordering::SeqCst) {
            self.gate.reached.notify_one();
            self.gate.release.notified().await;
        }
        self.inner.insert_order(order).await
    }

    async fn read_order(&self, id: OrderId) -> Result<Option<Order>> {
        self.inner.read_order(id).await
    }

    async fn find_orders(&self, filter: &OrderFilter, page: Page) -> Result<Vec<Order>> {
        self.inner.find_orders(filter, page).await
    }

    async fn update_order(&self, id: OrderId, patch: &OrderPatch) -> Result<Option<Order>> {
        self.inner.update_order(id, patch).await
    }

    async fn delete_order(&self, id: OrderId) -> Result<bool> {
        self.inner.delete_order(id).await
    }
}

type RaceEngine = FulfillmentEngine<InMemoryReplica, PausingDocument>;

/// Places an order whose document copy is missing, leaving it queued.
async fn queued_order() -> (Arc<RaceEngine>, InMemoryReplica, PausingDocument, OrderId) {
    let relational = InMemoryReplica::relational();
    let document = PausingDocument::new();
    let engine = Arc::new(FulfillmentEngine::new(relational.clone(), document.clone()));

    let item = engine
        .catalog()
        .create_item(NewItem::new("Fender", "part", Money::from_cents(2200), 5, 1))
        .await
        .unwrap();

    document.inner.set_fail_on_insert_order(true).await;
    let date = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
    let order = engine
        .place_order(OrderRequest::new(vec![LineItem::new(item.id, 1)], date, date))
        .await
        .unwrap();
    document.inner.set_fail_on_insert_order(false).await;
    assert_eq!(engine.pending_replications().await.len(), 1);

    (engine, relational, document, order.id)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_delete_during_replay_leaves_no_document_copy() {
    let (engine, relational, document, order_id) = queued_order().await;
    document.pause_next_insert();

    let replay = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.replay_pending_replications().await }
    });
    document.wait_until_paused().await;

    let delete = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.delete_order(order_id).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    document.resume();

    replay.await.unwrap().unwrap();
    assert!(delete.await.unwrap().unwrap());

    assert!(relational.read_order(order_id).await.unwrap().is_none());
    assert!(document.read_order(order_id).await.unwrap().is_none());
    assert!(engine.pending_replications().await.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_update_during_replay_reaches_document_copy() {
    let (engine, relational, document, order_id) = queued_order().await;
    document.pause_next_insert();

    let replay = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.replay_pending_replications().await }
    });
    document.wait_until_paused().await;

    let update = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move {
            engine
                .update_order(order_id, OrderPatch::status("delivered"))
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    document.resume();

    replay.await.unwrap().unwrap();
    update.await.unwrap().unwrap().unwrap();

    let canonical = relational.read_order(order_id).await.unwrap().unwrap();
    let copy = document.read_order(order_id).await.unwrap().unwrap();
    assert_eq!(canonical.status, "delivered");
    assert_eq!(copy, canonical);
    assert!(engine.pending_replications().await.is_empty());
}
