use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use common::ItemId;
use replica_store::{Replica, ReplicaStore, ReplicaStoreExt};

use crate::error::RollbackFailure;
use crate::locks::ItemLocks;
use crate::replicas::Replicas;
use crate::reservation::{OperationId, Reservation};

/// Outcome of one compensation pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CompensationReport {
    /// Items whose reservation is now undone on both replicas.
    pub restored: Vec<ItemId>,
    pub failures: Vec<RollbackFailure>,
}

impl CompensationReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Gives reserved stock back to both replicas.
///
/// Each `(operation, replica)` restoration is recorded once it lands, and
/// a recorded restoration is never applied again. Compensating the same
/// reservations twice therefore leaves stock where the first successful
/// pass put it, and a retry only redoes the writes that failed.
#[derive(Clone)]
pub struct Compensator<R, D> {
    replicas: Replicas<R, D>,
    locks: ItemLocks,
    applied: Arc<Mutex<HashSet<(OperationId, Replica)>>>,
}

impl<R, D> Compensator<R, D>
where
    R: ReplicaStore,
    D: ReplicaStore,
{
    pub fn new(replicas: Replicas<R, D>, locks: ItemLocks) -> Self {
        Self {
            replicas,
            locks,
            applied: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Restores every reservation in order, continuing past failures.
    #[tracing::instrument(skip(self, reservations), fields(count = reservations.len()))]
    pub async fn compensate(&self, reservations: &[Reservation]) -> CompensationReport {
        let mut report = CompensationReport::default();

        for reservation in reservations {
            let _lock = self.locks.acquire(reservation.item_id).await;
            let mut clean = true;

            if let Err(failure) = self
                .restore_once(&self.replicas.relational, reservation)
                .await
            {
                clean = false;
                report.failures.push(failure);
            }
            if let Err(failure) = self.restore_once(&self.replicas.document, reservation).await {
                clean = false;
                report.failures.push(failure);
            }

            if clean {
                report.restored.push(reservation.item_id);
            }
        }

        metrics::counter!("compensations_total").increment(1);
        if !report.is_clean() {
            metrics::counter!("rollback_failures_total").increment(report.failures.len() as u64);
            for failure in &report.failures {
                tracing::error!(
                    item_id = %failure.item_id,
                    replica = %failure.replica,
                    quantity = failure.quantity,
                    reason = %failure.reason,
                    "failed to restore reserved stock"
                );
            }
        } else {
            tracing::info!(restored = report.restored.len(), "reserved stock restored");
        }

        report
    }

    /// Whether the restoration of `operation_id` on `replica` has landed.
    pub fn is_applied(&self, operation_id: OperationId, replica: Replica) -> bool {
        self.ledger().contains(&(operation_id, replica))
    }

    async fn restore_once<S: ReplicaStore>(
        &self,
        store: &S,
        reservation: &Reservation,
    ) -> Result<(), RollbackFailure> {
        let key = (reservation.operation_id, store.replica());
        let already_applied = self.ledger().contains(&key);
        if already_applied {
            return Ok(());
        }

        Self::add_back(store, reservation)
            .await
            .map_err(|reason| RollbackFailure {
                item_id: reservation.item_id,
                replica: store.replica(),
                quantity: reservation.quantity,
                reason,
            })?;

        self.ledger().insert(key);
        Ok(())
    }

    /// Reads the current quantity and writes `current + reserved`.
    async fn add_back<S: ReplicaStore>(store: &S, reservation: &Reservation) -> Result<(), String> {
        let current = store
            .read_stock(reservation.item_id)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| "item no longer exists".to_string())?;

        let restored = current
            .quantity
            .checked_add(reservation.quantity)
            .ok_or_else(|| "restored quantity overflows".to_string())?;

        store
            .write_quantity(reservation.item_id, restored)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| "item no longer exists".to_string())?;
        Ok(())
    }

    fn ledger(&self) -> std::sync::MutexGuard<'_, HashSet<(OperationId, Replica)>> {
        self.applied
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
