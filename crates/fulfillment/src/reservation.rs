use std::fmt;

use common::ItemId;
use domain::Money;
use replica_store::{Replica, ReplicaStore};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{FulfillmentError, Result};
use crate::guard::ConsistencyGuard;
use crate::locks::ItemLocks;
use crate::replicas::Replicas;

/// Identifies one reservation: the placement attempt plus the line index.
///
/// Two compensations carrying the same id describe the same decrement,
/// which is what lets the compensator apply each one at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId {
    pub attempt: Uuid,
    pub line: usize,
}

impl OperationId {
    pub fn new(attempt: Uuid, line: usize) -> Self {
        Self { attempt, line }
    }

    /// An id for a reservation made outside any order placement.
    pub fn standalone() -> Self {
        Self::new(Uuid::new_v4(), 0)
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.attempt, self.line)
    }
}

/// A decrement applied to both replicas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub operation_id: OperationId,
    pub item_id: ItemId,
    /// Units taken.
    pub quantity: u32,
    /// Unit cost observed when the stock was checked.
    pub unit_cost: Money,
    pub previous_quantity: u32,
}

impl Reservation {
    /// Quantity left on hand right after this reservation. Never below zero,
    /// even for a hand-built reservation larger than its previous quantity.
    pub fn remaining(&self) -> u32 {
        self.previous_quantity.saturating_sub(self.quantity)
    }
}

/// Decrements stock on both replicas under the item's lock.
#[derive(Clone)]
pub struct StockReservation<R, D> {
    replicas: Replicas<R, D>,
    guard: ConsistencyGuard<R, D>,
    locks: ItemLocks,
}

impl<R, D> StockReservation<R, D>
where
    R: ReplicaStore + Clone,
    D: ReplicaStore + Clone,
{
    pub fn new(replicas: Replicas<R, D>, locks: ItemLocks) -> Self {
        Self {
            guard: ConsistencyGuard::new(replicas.clone()),
            replicas,
            locks,
        }
    }

    /// Takes `quantity` units of `item_id` from both replicas.
    ///
    /// The check, the availability test and both writes happen while the
    /// item's lock is held, so concurrent reservations of the same item
    /// cannot oversell. If the document write fails after the relational
    /// write succeeded, the relational quantity is put back and a
    /// `PartialReservationFailure` says whether that worked.
    #[tracing::instrument(skip(self, operation_id), fields(operation_id = %operation_id))]
    pub async fn reserve(
        &self,
        item_id: ItemId,
        quantity: u32,
        operation_id: OperationId,
    ) -> Result<Reservation> {
        if quantity == 0 {
            return Err(domain::DomainError::InvalidQuantity { item_id, quantity }.into());
        }

        let _lock = self.locks.acquire(item_id).await;
        let stock = self.guard.check(item_id).await?;

        if quantity > stock.quantity {
            tracing::warn!(
                %item_id,
                available = stock.quantity,
                requested = quantity,
                "insufficient stock"
            );
            return Err(FulfillmentError::InsufficientStock {
                item_id,
                available: stock.quantity,
                requested: quantity,
            });
        }
        let remaining = stock.quantity - quantity;

        match self.replicas.relational.write_quantity(item_id, remaining).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                return Err(FulfillmentError::ItemNotFound {
                    item_id,
                    replica: Replica::Relational,
                });
            }
            Err(e) => return Err(FulfillmentError::StoreUnavailable(e)),
        }

        let document_failure = match self.replicas.document.write_quantity(item_id, remaining).await
        {
            Ok(Some(_)) => None,
            Ok(None) => Some("item missing from document replica".to_string()),
            Err(e) => Some(e.to_string()),
        };

        if let Some(reason) = document_failure {
            let restored = matches!(
                self.replicas
                    .relational
                    .write_quantity(item_id, stock.quantity)
                    .await,
                Ok(Some(_))
            );
            tracing::error!(
                %item_id,
                previous_quantity = stock.quantity,
                requested = quantity,
                restored,
                %reason,
                "reservation applied to relational replica only"
            );
            return Err(FulfillmentError::PartialReservationFailure {
                item_id,
                requested: quantity,
                previous_quantity: stock.quantity,
                failed_replica: Replica::Document,
                reason,
                restored,
            });
        }

        metrics::counter!("stock_reservations_total").increment(1);
        tracing::debug!(%item_id, quantity, remaining, "stock reserved");

        Ok(Reservation {
            operation_id,
            item_id,
            quantity,
            unit_cost: stock.unit_cost,
            previous_quantity: stock.quantity,
        })
    }
}
