use async_trait::async_trait;
use common::{ItemId, OrderId};
use domain::{
    Item, ItemFilter, ItemPatch, NewItem, NewOrder, Order, OrderFilter, OrderPatch, Page,
    StockRecord,
};

use crate::{Replica, Result};

/// Uniform access to one replica's items and orders.
///
/// Implementations hold no cross-replica logic: each instance talks to
/// exactly one backing store and reports which one through `replica()`.
/// Lookups return `Ok(None)` for a missing record and `Err` only when the
/// replica itself failed. All implementations must be thread-safe.
#[async_trait]
pub trait ReplicaStore: Send + Sync {
    /// The replica this store writes to.
    fn replica(&self) -> Replica;

    /// Inserts an item.
    ///
    /// Uses `item.id` when present, otherwise assigns a fresh identifier.
    /// Fails with `Duplicate` if the identifier is taken.
    async fn insert_item(&self, item: NewItem) -> Result<Item>;

    /// Reads a single item.
    async fn read_item(&self, id: ItemId) -> Result<Option<Item>>;

    /// Items matching every set field of `filter`, ordered by name, then
    /// windowed by `page`.
    async fn find_items(&self, filter: &ItemFilter, page: Page) -> Result<Vec<Item>>;

    /// Applies a partial update. Returns `None` if the item does not exist.
    async fn update_item(&self, id: ItemId, patch: &ItemPatch) -> Result<Option<Item>>;

    /// Overwrites the quantity on hand. Returns `None` if the item does not exist.
    async fn write_quantity(&self, id: ItemId, quantity: u32) -> Result<Option<Item>>;

    /// Deletes an item. Returns whether a record was removed.
    async fn delete_item(&self, id: ItemId) -> Result<bool>;

    /// Inserts an order.
    ///
    /// Uses `order.id` when present, otherwise assigns a fresh identifier.
    /// Fails with `Duplicate` if the identifier is taken.
    async fn insert_order(&self, order: NewOrder) -> Result<Order>;

    /// Reads a single order.
    async fn read_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Orders matching every set field of `filter`, ordered by order date,
    /// then windowed by `page`.
    async fn find_orders(&self, filter: &OrderFilter, page: Page) -> Result<Vec<Order>>;

    /// Applies a direct field update. Returns `None` if the order does not exist.
    async fn update_order(&self, id: OrderId, patch: &OrderPatch) -> Result<Option<Order>>;

    /// Deletes an order. Returns whether a record was removed.
    async fn delete_order(&self, id: OrderId) -> Result<bool>;
}

/// Extension trait providing convenience methods for replica stores.
#[async_trait]
pub trait ReplicaStoreExt: ReplicaStore {
    /// Reads only the `{quantity, cost}` pair of an item.
    async fn read_stock(&self, id: ItemId) -> Result<Option<StockRecord>> {
        Ok(self.read_item(id).await?.map(|item| item.stock()))
    }

    /// Every item, ordered by name.
    async fn list_items(&self) -> Result<Vec<Item>> {
        self.find_items(&ItemFilter::default(), Page::all()).await
    }

    /// Every order, ordered by order date.
    async fn list_orders(&self) -> Result<Vec<Order>> {
        self.find_orders(&OrderFilter::default(), Page::all()).await
    }

    /// Checks if an order exists in this replica.
    async fn order_exists(&self, id: OrderId) -> Result<bool> {
        Ok(self.read_order(id).await?.is_some())
    }
}

// Blanket implementation for all ReplicaStore implementations
impl<T: ReplicaStore + ?Sized> ReplicaStoreExt for T {}
