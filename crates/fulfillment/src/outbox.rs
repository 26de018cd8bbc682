use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::OrderId;
use serde::Serialize;
use tokio::sync::Mutex;

/// An order whose document copy has not caught up with the relational
/// record: a missed insert, update or delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingReplication {
    pub order_id: OrderId,
    pub attempts: u32,
    pub last_error: String,
    pub enqueued_at: DateTime<Utc>,
}

/// Result of one replay pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    pub replicated: usize,
    /// Orders gone from the relational replica whose document copy was
    /// removed.
    pub deleted: usize,
    pub still_pending: usize,
}

/// Orders whose document copy is behind the relational replica.
///
/// Keyed by order id, so enqueuing the same order twice keeps one entry.
/// Only the id is stored: replay makes the document copy match the current
/// relational record, removing it when the relational record is gone.
#[derive(Clone, Default)]
pub struct ReplicationOutbox {
    pending: Arc<Mutex<BTreeMap<OrderId, PendingReplication>>>,
}

impl ReplicationOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that an order still has to reach the document replica.
    pub async fn enqueue(&self, order_id: OrderId, error: impl Into<String>) {
        let error = error.into();
        let mut pending = self.pending.lock().await;
        if let Some(entry) = pending.get_mut(&order_id) {
            entry.last_error = error;
            return;
        }
        pending.insert(
            order_id,
            PendingReplication {
                order_id,
                attempts: 0,
                last_error: error,
                enqueued_at: Utc::now(),
            },
        );
        metrics::counter!("replication_pending_total").increment(1);
    }

    /// Removes an entry, returning whether it existed.
    pub async fn remove(&self, order_id: OrderId) -> bool {
        self.pending.lock().await.remove(&order_id).is_some()
    }

    /// Counts a failed replay attempt.
    pub async fn record_failure(&self, order_id: OrderId, error: impl Into<String>) {
        if let Some(entry) = self.pending.lock().await.get_mut(&order_id) {
            entry.attempts += 1;
            entry.last_error = error.into();
        }
    }

    /// Snapshot of every pending entry, ordered by order id.
    pub async fn pending(&self) -> Vec<PendingReplication> {
        self.pending.lock().await.values().cloned().collect()
    }

    pub async fn contains(&self, order_id: OrderId) -> bool {
        self.pending.lock().await.contains_key(&order_id)
    }

    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pending.lock().await.is_empty()
    }
}
