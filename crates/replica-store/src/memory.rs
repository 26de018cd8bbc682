use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{ItemId, OrderId};
use domain::{
    Item, ItemFilter, ItemPatch, NewItem, NewOrder, Order, OrderFilter, OrderPatch, Page,
};
use tokio::sync::RwLock;

use crate::{Replica, ReplicaStore, Result, StoreError};

/// Failures a test can arm on an in-memory replica.
#[derive(Debug, Default)]
struct Faults {
    unavailable: bool,
    fail_on_read: bool,
    fail_on_insert_order: bool,
    /// `Some(n)`: the next `n` quantity writes succeed, later ones fail.
    quantity_writes_left: Option<usize>,
}

#[derive(Debug, Default)]
struct ReplicaState {
    items: HashMap<ItemId, Item>,
    orders: HashMap<OrderId, Order>,
    faults: Faults,
}

/// In-memory replica implementation for testing and local runs.
///
/// Behaves like the database-backed replicas and adds fault injection so
/// tests can make one replica fail at a precise step.
#[derive(Clone)]
pub struct InMemoryReplica {
    replica: Replica,
    state: Arc<RwLock<ReplicaState>>,
}

impl InMemoryReplica {
    /// Creates an empty replica of the given kind.
    pub fn new(replica: Replica) -> Self {
        Self {
            replica,
            state: Arc::new(RwLock::new(ReplicaState::default())),
        }
    }

    /// Creates an empty relational replica.
    pub fn relational() -> Self {
        Self::new(Replica::Relational)
    }

    /// Creates an empty document replica.
    pub fn document() -> Self {
        Self::new(Replica::Document)
    }

    /// Makes every operation fail as if the replica were unreachable.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.write().await.faults.unavailable = unavailable;
    }

    /// Makes item and order reads fail.
    pub async fn set_fail_on_read(&self, fail: bool) {
        self.state.write().await.faults.fail_on_read = fail;
    }

    /// Makes order inserts fail.
    pub async fn set_fail_on_insert_order(&self, fail: bool) {
        self.state.write().await.faults.fail_on_insert_order = fail;
    }

    /// Lets the next `successes` quantity writes through, then fails every
    /// later one until cleared.
    pub async fn fail_quantity_writes_after(&self, successes: usize) {
        self.state.write().await.faults.quantity_writes_left = Some(successes);
    }

    /// Removes any quantity-write failure armed earlier.
    pub async fn clear_quantity_write_failures(&self) {
        self.state.write().await.faults.quantity_writes_left = None;
    }

    /// Stores an item as-is, bypassing faults and duplicate checks.
    pub async fn seed_item(&self, item: Item) {
        self.state.write().await.items.insert(item.id, item);
    }

    /// Overwrites a quantity as-is, bypassing faults. Used to set up
    /// diverged replicas.
    pub async fn force_quantity(&self, id: ItemId, quantity: u32) {
        if let Some(item) = self.state.write().await.items.get_mut(&id) {
            item.quantity = quantity;
        }
    }

    /// Returns the number of stored items.
    pub async fn item_count(&self) -> usize {
        self.state.read().await.items.len()
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    fn ensure_reachable(&self, faults: &Faults) -> Result<()> {
        if faults.unavailable {
            return Err(StoreError::unavailable(self.replica, "replica is offline"));
        }
        Ok(())
    }

    fn ensure_readable(&self, faults: &Faults) -> Result<()> {
        self.ensure_reachable(faults)?;
        if faults.fail_on_read {
            return Err(StoreError::unavailable(self.replica, "read failed"));
        }
        Ok(())
    }

    fn duplicate(&self, kind: &'static str, id: impl ToString) -> StoreError {
        StoreError::Duplicate {
            replica: self.replica,
            kind,
            id: id.to_string(),
        }
    }
}

#[async_trait]
impl ReplicaStore for InMemoryReplica {
    fn replica(&self) -> Replica {
        self.replica
    }

    async fn insert_item(&self, item: NewItem) -> Result<Item> {
        let mut state = self.state.write().await;
        self.ensure_reachable(&state.faults)?;

        let id = item.id.unwrap_or_default();
        if state.items.contains_key(&id) {
            return Err(self.duplicate("item", id));
        }
        let item = item.into_item(id);
        state.items.insert(id, item.clone());
        Ok(item)
    }

    async fn read_item(&self, id: ItemId) -> Result<Option<Item>> {
        let state = self.state.read().await;
        self.ensure_readable(&state.faults)?;
        Ok(state.items.get(&id).cloned())
    }

    async fn find_items(&self, filter: &ItemFilter, page: Page) -> Result<Vec<Item>> {
        let state = self.state.read().await;
        self.ensure_readable(&state.faults)?;
        let mut items: Vec<_> = state
            .items
            .values()
            .filter(|item| filter.matches(item))
            .cloned()
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(page.apply(items))
    }

    async fn update_item(&self, id: ItemId, patch: &ItemPatch) -> Result<Option<Item>> {
        let mut state = self.state.write().await;
        self.ensure_reachable(&state.faults)?;
        Ok(state.items.get_mut(&id).map(|item| {
            patch.apply(item);
            item.clone()
        }))
    }

    async fn write_quantity(&self, id: ItemId, quantity: u32) -> Result<Option<Item>> {
        let mut state = self.state.write().await;
        self.ensure_reachable(&state.faults)?;

        match state.faults.quantity_writes_left {
            Some(0) => {
                return Err(StoreError::unavailable(
                    self.replica,
                    "quantity write failed",
                ));
            }
            Some(n) => state.faults.quantity_writes_left = Some(n - 1),
            None => {}
        }

        Ok(state.items.get_mut(&id).map(|item| {
            item.quantity = quantity;
            item.clone()
        }))
    }

    async fn delete_item(&self, id: ItemId) -> Result<bool> {
        let mut state = self.state.write().await;
        self.ensure_reachable(&state.faults)?;
        Ok(state.items.remove(&id).is_some())
    }

    async fn insert_order(&self, order: NewOrder) -> Result<Order> {
        let mut state = self.state.write().await;
        self.ensure_reachable(&state.faults)?;
        if state.faults.fail_on_insert_order {
            return Err(StoreError::unavailable(self.replica, "order insert failed"));
        }

        let id = order.id.unwrap_or_default();
        if state.orders.contains_key(&id) {
            return Err(self.duplicate("order", id));
        }
        let order = order.into_order(id);
        state.orders.insert(id, order.clone());
        Ok(order)
    }

    async fn read_order(&self, id: OrderId) -> Result<Option<Order>> {
        let state = self.state.read().await;
        self.ensure_readable(&state.faults)?;
        Ok(state.orders.get(&id).cloned())
    }

    async fn find_orders(&self, filter: &OrderFilter, page: Page) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        self.ensure_readable(&state.faults)?;
        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|order| filter.matches(order))
            .cloned()
            .collect();
        orders.sort_by(|a, b| a.order_date.cmp(&b.order_date).then(a.id.cmp(&b.id)));
        Ok(page.apply(orders))
    }

    async fn update_order(&self, id: OrderId, patch: &OrderPatch) -> Result<Option<Order>> {
        let mut state = self.state.write().await;
        self.ensure_reachable(&state.faults)?;
        Ok(state.orders.get_mut(&id).map(|order| {
            patch.apply(order);
            order.clone()
        }))
    }

    async fn delete_order(&self, id: OrderId) -> Result<bool> {
        let mut state = self.state.write().await;
        self.ensure_reachable(&state.faults)?;
        Ok(state.orders.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use domain::{LineItem, Money, OrderRequest};

    use super::*;
    use crate::ReplicaStoreExt;

    fn new_item(quantity: u32) -> NewItem {
        NewItem::new("Widget", "part", Money::from_cents(1000), quantity, 2)
    }

    fn new_order() -> NewOrder {
        let date = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let request = OrderRequest::new(vec![LineItem::new(ItemId::new(), 1)], date, date);
        NewOrder::from_request(request, Money::from_cents(1000))
    }

    #[tokio::test]
    async fn test_insert_assigns_id_when_missing() {
        let store = InMemoryReplica::relational();
        let item = store.insert_item(new_item(5)).await.unwrap();

        let loaded = store.read_item(item.id).await.unwrap().unwrap();
        assert_eq!(loaded, item);
        assert_eq!(store.item_count().await, 1);
    }

    #[tokio::test]
    async fn test_insert_keeps_given_id_and_rejects_duplicates() {
        let store = InMemoryReplica::document();
        let id = ItemId::new();

        let item = store.insert_item(new_item(5).with_id(id)).await.unwrap();
        assert_eq!(item.id, id);

        let err = store.insert_item(new_item(5).with_id(id)).await.unwrap_err();
        assert!(err.is_duplicate());
        assert_eq!(err.replica(), Replica::Document);
    }

    #[tokio::test]
    async fn test_missing_records_are_none_not_errors() {
        let store = InMemoryReplica::relational();
        assert!(store.read_item(ItemId::new()).await.unwrap().is_none());
        assert!(store.read_stock(ItemId::new()).await.unwrap().is_none());
        assert!(
            store
                .write_quantity(ItemId::new(), 3)
                .await
                .unwrap()
                .is_none()
        );
        assert!(!store.delete_order(OrderId::new()).await.unwrap());
    }

    #[tokio::test]
    async fn test_write_quantity() {
        let store = InMemoryReplica::relational();
        let item = store.insert_item(new_item(5)).await.unwrap();

        let updated = store.write_quantity(item.id, 2).await.unwrap().unwrap();
        assert_eq!(updated.quantity, 2);
        assert_eq!(store.read_stock(item.id).await.unwrap().unwrap().quantity, 2);
    }

    #[tokio::test]
    async fn test_unavailable_replica_fails_every_call() {
        let store = InMemoryReplica::document();
        let item = store.insert_item(new_item(5)).await.unwrap();
        store.set_unavailable(true).await;

        let err = store.read_item(item.id).await.unwrap_err();
        assert!(err.is_unavailable());
        assert!(store.write_quantity(item.id, 1).await.is_err());
        assert!(store.insert_order(new_order()).await.is_err());

        store.set_unavailable(false).await;
        assert!(store.read_item(item.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_fail_quantity_writes_after() {
        let store = InMemoryReplica::relational();
        let item = store.insert_item(new_item(9)).await.unwrap();
        store.fail_quantity_writes_after(1).await;

        assert!(store.write_quantity(item.id, 8).await.is_ok());
        assert!(store.write_quantity(item.id, 7).await.is_err());
        assert_eq!(store.read_stock(item.id).await.unwrap().unwrap().quantity, 8);

        store.clear_quantity_write_failures().await;
        assert!(store.write_quantity(item.id, 7).await.is_ok());
    }

    #[tokio::test]
    async fn test_fail_on_read_leaves_writes_working() {
        let store = InMemoryReplica::relational();
        let item = store.insert_item(new_item(4)).await.unwrap();
        store.set_fail_on_read(true).await;

        assert!(store.read_item(item.id).await.is_err());
        assert!(store.write_quantity(item.id, 1).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_order_lifecycle() {
        let store = InMemoryReplica::relational();
        let order = store.insert_order(new_order()).await.unwrap();
        assert!(store.order_exists(order.id).await.unwrap());

        let patched = store
            .update_order(order.id, &OrderPatch::status("delivered"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(patched.status, "delivered");
        assert_eq!(patched.total_amount, order.total_amount);

        assert!(store.delete_order(order.id).await.unwrap());
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn test_fail_on_insert_order() {
        let store = InMemoryReplica::document();
        store.set_fail_on_insert_order(true).await;
        assert!(store.insert_order(new_order()).await.is_err());
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn test_list_items_sorted_by_name() {
        let store = InMemoryReplica::relational();
        store
            .insert_item(NewItem::new("Zeta", "x", Money::zero(), 1, 0))
            .await
            .unwrap();
        store
            .insert_item(NewItem::new("Alpha", "x", Money::zero(), 1, 0))
            .await
            .unwrap();

        let names: Vec<_> = store
            .list_items()
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.name)
            .collect();
        assert_eq!(names, ["Alpha", "Zeta"]);
    }

    #[tokio::test]
    async fn test_find_items_filters_then_pages() {
        let store = InMemoryReplica::relational();
        for name in ["Bell", "Brake", "Cable", "Chain"] {
            store
                .insert_item(NewItem::new(name, "part", Money::from_cents(500), 3, 1))
                .await
                .unwrap();
        }
        store
            .insert_item(NewItem::new("Basket", "accessory", Money::from_cents(500), 3, 1))
            .await
            .unwrap();

        let parts = ItemFilter {
            kind: Some("part".to_string()),
            ..ItemFilter::default()
        };
        let names: Vec<_> = store
            .find_items(&parts, Page::new(1, 2))
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.name)
            .collect();
        assert_eq!(names, ["Brake", "Cable"]);

        let by_name = ItemFilter {
            name: Some("Basket".to_string()),
            ..ItemFilter::default()
        };
        assert_eq!(store.find_items(&by_name, Page::default()).await.unwrap().len(), 1);
        assert_eq!(store.find_items(&ItemFilter::default(), Page::default()).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_find_orders_by_status() {
        let store = InMemoryReplica::document();
        let shipped = store.insert_order(new_order()).await.unwrap();
        store.insert_order(new_order()).await.unwrap();
        store
            .update_order(shipped.id, &OrderPatch::status("shipped"))
            .await
            .unwrap();

        let filter = OrderFilter {
            status: Some("shipped".to_string()),
            ..OrderFilter::default()
        };
        let found = store.find_orders(&filter, Page::default()).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, shipped.id);
        assert_eq!(store.list_orders().await.unwrap().len(), 2);
    }
}
