//! Order assembly over both replicas.

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::OrderId;
use domain::{NewOrder, Order, OrderFilter, OrderPatch, OrderRequest, Page, order_total};
use replica_store::{Replica, ReplicaStore};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::compensator::Compensator;
use crate::error::{FulfillmentError, Result};
use crate::locks::{ItemLocks, OrderLocks};
use crate::outbox::{PendingReplication, ReplayReport, ReplicationOutbox};
use crate::replicas::Replicas;
use crate::reservation::{OperationId, Reservation, StockReservation};

/// Places orders against the relational and document replicas.
///
/// Line items are reserved in request order. Any failure before the
/// relational order row exists gives every earlier reservation back and
/// returns the error that stopped placement. Once the relational row
/// exists the order stands: a missed document write is queued for replay
/// instead of undoing the order.
///
/// Order edits, deletes and replay of one order hold that order's lock, so
/// replay never copies a record that an edit or delete is replacing.
pub struct FulfillmentEngine<R, D> {
    replicas: Replicas<R, D>,
    locks: ItemLocks,
    order_locks: OrderLocks,
    reservation: StockReservation<R, D>,
    compensator: Compensator<R, D>,
    outbox: ReplicationOutbox,
}

impl<R, D> FulfillmentEngine<R, D>
where
    R: ReplicaStore + Clone,
    D: ReplicaStore + Clone,
{
    /// Creates a new engine over the given replicas.
    pub fn new(relational: R, document: D) -> Self {
        let replicas = Replicas::new(relational, document);
        let locks = ItemLocks::new();
        Self {
            reservation: StockReservation::new(replicas.clone(), locks.clone()),
            compensator: Compensator::new(replicas.clone(), locks.clone()),
            outbox: ReplicationOutbox::new(),
            replicas,
            locks,
            order_locks: OrderLocks::new(),
        }
    }

    /// Catalog over the same replicas, sharing this engine's item locks.
    pub fn catalog(&self) -> Catalog<R, D> {
        Catalog::new(self.replicas.clone(), self.locks.clone())
    }

    pub fn replicas(&self) -> &Replicas<R, D> {
        &self.replicas
    }

    pub fn compensator(&self) -> &Compensator<R, D> {
        &self.compensator
    }

    /// Reserves stock for every line item and records the order.
    #[tracing::instrument(skip(self, request), fields(lines = request.line_items.len()))]
    pub async fn place_order(&self, request: OrderRequest) -> Result<Order> {
        let start = Instant::now();
        let result = self.assemble(request).await;
        metrics::histogram!("order_placement_duration_seconds")
            .record(start.elapsed().as_secs_f64());

        match &result {
            Ok(order) => {
                metrics::counter!("orders_placed_total").increment(1);
                tracing::info!(
                    order_id = %order.id,
                    total = %order.total_amount,
                    "order placed"
                );
            }
            Err(e) => {
                metrics::counter!("orders_failed_total").increment(1);
                tracing::warn!(error = %e, "order placement failed");
            }
        }
        result
    }

    async fn assemble(&self, request: OrderRequest) -> Result<Order> {
        request.validate()?;

        let attempt = Uuid::new_v4();
        let mut reserved: Vec<Reservation> = Vec::with_capacity(request.line_items.len());

        for (line, item) in request.line_items.iter().enumerate() {
            let operation_id = OperationId::new(attempt, line);
            match self
                .reservation
                .reserve(item.item_id, item.quantity, operation_id)
                .await
            {
                Ok(reservation) => reserved.push(reservation),
                Err(e) => return Err(self.unwind(&reserved, e).await),
            }
        }

        let total = match order_total(reserved.iter().map(|r| (r.unit_cost, r.quantity))) {
            Ok(total) => total,
            Err(e) => return Err(self.unwind(&reserved, e.into()).await),
        };

        let new_order = NewOrder::from_request(request, total);
        let order = match self.replicas.relational.insert_order(new_order).await {
            Ok(order) => order,
            Err(source) => {
                let cause = FulfillmentError::OrderPersistFailure {
                    replica: Replica::Relational,
                    source,
                };
                return Err(self.unwind(&reserved, cause).await);
            }
        };
        let _order_lock = self.order_locks.acquire(order.id).await;

        match self
            .replicas
            .document
            .insert_order(NewOrder::from(order.clone()))
            .await
        {
            Ok(_) => {}
            Err(e) if e.is_duplicate() => {}
            Err(e) => {
                tracing::error!(
                    order_id = %order.id,
                    error = %e,
                    "document replica missed order, queued for replication"
                );
                self.outbox.enqueue(order.id, e.to_string()).await;
            }
        }

        Ok(order)
    }

    /// Compensates `reserved` and picks the error to report.
    async fn unwind(&self, reserved: &[Reservation], cause: FulfillmentError) -> FulfillmentError {
        if reserved.is_empty() {
            return cause;
        }

        let report = self.compensator.compensate(reserved).await;
        if report.is_clean() {
            cause
        } else {
            FulfillmentError::RollbackFailed {
                cause: Box::new(cause),
                failures: report.failures,
            }
        }
    }

    /// Reads an order from the relational replica.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.replicas.relational.read_order(id).await?)
    }

    /// Orders matching `filter`, read from the relational replica.
    pub async fn list_orders(&self, filter: &OrderFilter, page: Page) -> Result<Vec<Order>> {
        Ok(self.replicas.relational.find_orders(filter, page).await?)
    }

    /// Updates status or dates on both replicas.
    ///
    /// Stock is not touched. If the document replica misses the update the
    /// order is queued, and replay copies the relational record over.
    #[tracing::instrument(skip(self, patch))]
    pub async fn update_order(&self, id: OrderId, patch: OrderPatch) -> Result<Option<Order>> {
        let _lock = self.order_locks.acquire(id).await;
        let Some(order) = self.replicas.relational.update_order(id, &patch).await? else {
            return Ok(None);
        };

        let missed = match self.replicas.document.update_order(id, &patch).await {
            Ok(Some(_)) => None,
            Ok(None) => Some("order missing from document replica".to_string()),
            Err(e) => Some(e.to_string()),
        };
        if let Some(reason) = missed {
            tracing::warn!(order_id = %id, %reason, "document replica missed order update");
            self.outbox.enqueue(id, reason).await;
        }

        Ok(Some(order))
    }

    /// Deletes an order from both replicas. Reserved stock is not returned.
    ///
    /// Once the relational row is gone the delete stands. A document copy
    /// that could not be removed is queued, and replay removes it.
    #[tracing::instrument(skip(self))]
    pub async fn delete_order(&self, id: OrderId) -> Result<bool> {
        let _lock = self.order_locks.acquire(id).await;
        let relational = self.replicas.relational.delete_order(id).await?;

        match self.replicas.document.delete_order(id).await {
            Ok(document) => {
                self.outbox.remove(id).await;
                Ok(relational || document)
            }
            Err(e) if relational => {
                tracing::warn!(
                    order_id = %id,
                    error = %e,
                    "document replica missed order delete, queued for replication"
                );
                self.outbox.enqueue(id, e.to_string()).await;
                Ok(true)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Orders the document replica has not caught up on.
    pub async fn pending_replications(&self) -> Vec<PendingReplication> {
        self.outbox.pending().await
    }

    /// Brings every queued order's document copy in line with the
    /// relational replica.
    ///
    /// Present orders are inserted, or their status and dates overwritten
    /// when a copy already exists. Orders gone from the relational replica
    /// are removed from the document replica.
    #[tracing::instrument(skip(self))]
    pub async fn replay_pending_replications(&self) -> Result<ReplayReport> {
        let mut report = ReplayReport::default();

        for entry in self.outbox.pending().await {
            let order_id = entry.order_id;
            let _lock = self.order_locks.acquire(order_id).await;
            // An edit or delete that ran while we waited may have settled it.
            if !self.outbox.contains(order_id).await {
                continue;
            }

            let outcome = match self.replicas.relational.read_order(order_id).await? {
                Some(order) => self.copy_to_document(order).await.map(|()| false),
                None => self
                    .replicas
                    .document
                    .delete_order(order_id)
                    .await
                    .map(|_| true),
            };

            match outcome {
                Ok(deleted) => {
                    self.outbox.remove(order_id).await;
                    if deleted {
                        report.deleted += 1;
                    } else {
                        report.replicated += 1;
                    }
                    metrics::counter!("replication_replayed_total").increment(1);
                }
                Err(e) => {
                    tracing::warn!(%order_id, error = %e, attempts = entry.attempts + 1, "replay failed");
                    self.outbox.record_failure(order_id, e.to_string()).await;
                    report.still_pending += 1;
                }
            }
        }

        if report != ReplayReport::default() {
            tracing::info!(
                replicated = report.replicated,
                deleted = report.deleted,
                still_pending = report.still_pending,
                "replication replay finished"
            );
        }
        Ok(report)
    }

    async fn copy_to_document(&self, order: Order) -> replica_store::Result<()> {
        let order_id = order.id;
        let patch = OrderPatch {
            status: Some(order.status.clone()),
            order_date: Some(order.order_date),
            delivery_date: Some(order.delivery_date),
        };
        match self.replicas.document.insert_order(NewOrder::from(order)).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_duplicate() => {
                self.replicas.document.update_order(order_id, &patch).await?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

impl<R, D> FulfillmentEngine<R, D>
where
    R: ReplicaStore + Clone + 'static,
    D: ReplicaStore + Clone + 'static,
{
    /// Replays the outbox every `period` until the task is aborted.
    pub fn spawn_replication(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if self.outbox.is_empty().await {
                    continue;
                }
                if let Err(e) = self.replay_pending_replications().await {
                    tracing::warn!(error = %e, "replication replay aborted");
                }
            }
        })
    }
}
