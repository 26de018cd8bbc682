use common::ItemId;
use domain::StockRecord;
use replica_store::{Replica, ReplicaStore, ReplicaStoreExt};

use crate::error::{FulfillmentError, Result};
use crate::replicas::Replicas;

/// Confirms both replicas agree on an item before anything acts on it.
#[derive(Clone)]
pub struct ConsistencyGuard<R, D> {
    replicas: Replicas<R, D>,
}

impl<R, D> ConsistencyGuard<R, D>
where
    R: ReplicaStore,
    D: ReplicaStore,
{
    pub fn new(replicas: Replicas<R, D>) -> Self {
        Self { replicas }
    }

    /// Returns the agreed stock record for `item_id`.
    ///
    /// Reads relational first, then document. Fails with `ItemNotFound`
    /// naming the first replica missing the item, or `ReplicaDivergence`
    /// when quantity or unit cost differ. Never writes.
    #[tracing::instrument(skip(self))]
    pub async fn check(&self, item_id: ItemId) -> Result<StockRecord> {
        let relational = self
            .replicas
            .relational
            .read_stock(item_id)
            .await?
            .ok_or(FulfillmentError::ItemNotFound {
                item_id,
                replica: Replica::Relational,
            })?;

        let document = self
            .replicas
            .document
            .read_stock(item_id)
            .await?
            .ok_or(FulfillmentError::ItemNotFound {
                item_id,
                replica: Replica::Document,
            })?;

        if relational != document {
            metrics::counter!("replica_divergence_total").increment(1);
            tracing::warn!(
                %item_id,
                relational = %relational,
                document = %document,
                "replicas disagree on stock"
            );
            return Err(FulfillmentError::ReplicaDivergence {
                item_id,
                relational,
                document,
            });
        }

        Ok(relational)
    }
}
