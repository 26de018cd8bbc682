//! Order fulfillment across the relational and document replicas.
//!
//! Placing an order runs in three stages:
//! 1. Every line item is checked with the [`ConsistencyGuard`] and
//!    reserved on both replicas by [`StockReservation`]
//! 2. The total is computed from the unit costs seen while reserving
//! 3. The order is written to the relational replica, then the document
//!    replica
//!
//! If a stage fails before the relational order exists, the
//! [`Compensator`] gives back every reservation made so far. A document
//! write that fails after that point is queued in the
//! [`ReplicationOutbox`] and replayed later.

pub mod catalog;
pub mod compensator;
pub mod engine;
pub mod error;
pub mod guard;
pub mod locks;
pub mod outbox;
pub mod replicas;
pub mod reservation;

pub use catalog::Catalog;
pub use compensator::{CompensationReport, Compensator};
pub use engine::FulfillmentEngine;
pub use error::{FulfillmentError, Result, RollbackFailure};
pub use guard::ConsistencyGuard;
pub use locks::{ItemLockGuard, ItemLocks, KeyLockGuard, KeyedLocks, OrderLocks};
pub use outbox::{PendingReplication, ReplayReport, ReplicationOutbox};
pub use replicas::Replicas;
pub use reservation::{OperationId, Reservation, StockReservation};
