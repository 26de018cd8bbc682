use common::ItemId;
use domain::{Item, ItemFilter, ItemPatch, NewItem, Page};
use replica_store::{Replica, ReplicaStore, ReplicaStoreExt};

use crate::error::{FulfillmentError, Result};
use crate::locks::ItemLocks;
use crate::replicas::Replicas;

/// Item ("piece") management across both replicas.
///
/// Creates and updates go relational first, deletes go document first, all
/// under the same item locks reservations use. When the second write fails
/// the first is undone, so a catalog edit never leaves the replicas
/// disagreeing.
#[derive(Clone)]
pub struct Catalog<R, D> {
    replicas: Replicas<R, D>,
    locks: ItemLocks,
}

impl<R, D> Catalog<R, D>
where
    R: ReplicaStore,
    D: ReplicaStore,
{
    pub fn new(replicas: Replicas<R, D>, locks: ItemLocks) -> Self {
        Self { replicas, locks }
    }

    /// Creates an item. The relational replica assigns the id and the
    /// document replica stores the same record under it.
    #[tracing::instrument(skip(self, item), fields(name = %item.name))]
    pub async fn create_item(&self, item: NewItem) -> Result<Item> {
        item.validate()?;

        let created = self.replicas.relational.insert_item(item.clone()).await?;
        let _lock = self.locks.acquire(created.id).await;

        if let Err(e) = self
            .replicas
            .document
            .insert_item(item.with_id(created.id))
            .await
        {
            if let Err(undo) = self.replicas.relational.delete_item(created.id).await {
                tracing::error!(
                    item_id = %created.id,
                    error = %undo,
                    "failed to remove half-created item from relational replica"
                );
            }
            return Err(e.into());
        }

        tracing::info!(item_id = %created.id, "item created");
        Ok(created)
    }

    /// Reads an item from the relational replica.
    pub async fn get_item(&self, id: ItemId) -> Result<Option<Item>> {
        Ok(self.replicas.relational.read_item(id).await?)
    }

    /// Items matching `filter`, read from the relational replica.
    pub async fn list_items(&self, filter: &ItemFilter, page: Page) -> Result<Vec<Item>> {
        Ok(self.replicas.relational.find_items(filter, page).await?)
    }

    /// Items at or below their alert threshold.
    pub async fn low_stock_items(&self) -> Result<Vec<Item>> {
        let items = self.replicas.relational.list_items().await?;
        Ok(items.into_iter().filter(Item::is_low_stock).collect())
    }

    /// Applies a partial update to both replicas.
    #[tracing::instrument(skip(self, patch))]
    pub async fn update_item(&self, id: ItemId, patch: ItemPatch) -> Result<Option<Item>> {
        patch.validate()?;
        let _lock = self.locks.acquire(id).await;

        let Some(before) = self.replicas.relational.read_item(id).await? else {
            return Ok(None);
        };
        let Some(updated) = self.replicas.relational.update_item(id, &patch).await? else {
            return Ok(None);
        };

        let failure = match self.replicas.document.update_item(id, &patch).await {
            Ok(Some(_)) => None,
            Ok(None) => Some(FulfillmentError::ItemNotFound {
                item_id: id,
                replica: Replica::Document,
            }),
            Err(e) => Some(e.into()),
        };

        if let Some(err) = failure {
            let restore = restore_patch(&before);
            if let Err(undo) = self.replicas.relational.update_item(id, &restore).await {
                tracing::error!(
                    item_id = %id,
                    error = %undo,
                    "failed to undo relational item update"
                );
            }
            return Err(err);
        }

        Ok(Some(updated))
    }

    /// Sets the quantity on hand directly, e.g. after a restock.
    pub async fn update_quantity(&self, id: ItemId, quantity: u32) -> Result<Option<Item>> {
        self.update_item(id, ItemPatch::quantity(quantity)).await
    }

    /// Removes an item from both replicas.
    ///
    /// The document copy goes first. If the relational delete then fails,
    /// the document copy is put back so both replicas still hold the item.
    #[tracing::instrument(skip(self))]
    pub async fn delete_item(&self, id: ItemId) -> Result<bool> {
        let _lock = self.locks.acquire(id).await;

        let before = self.replicas.document.read_item(id).await?;
        let document = self.replicas.document.delete_item(id).await?;

        let relational = match self.replicas.relational.delete_item(id).await {
            Ok(deleted) => deleted,
            Err(e) => {
                if let Some(item) = before
                    && document
                    && let Err(undo) = self.replicas.document.insert_item(to_new_item(item)).await
                {
                    tracing::error!(
                        item_id = %id,
                        error = %undo,
                        "failed to restore document item after relational delete failed"
                    );
                }
                return Err(e.into());
            }
        };

        Ok(relational || document)
    }
}

/// Insertable copy of `item` that keeps its id.
fn to_new_item(item: Item) -> NewItem {
    NewItem::new(
        item.name,
        item.kind,
        item.unit_cost,
        item.quantity,
        item.alert_threshold,
    )
    .with_id(item.id)
}

/// Patch that writes every field of `item` back.
fn restore_patch(item: &Item) -> ItemPatch {
    ItemPatch {
        name: Some(item.name.clone()),
        kind: Some(item.kind.clone()),
        unit_cost: Some(item.unit_cost),
        quantity: Some(item.quantity),
        alert_threshold: Some(item.alert_threshold),
    }
}
