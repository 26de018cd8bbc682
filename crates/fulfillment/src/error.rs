//! Fulfillment error types.

use common::ItemId;
use domain::{DomainError, StockRecord};
use replica_store::{Replica, StoreError};
use thiserror::Error;

/// One restoration the compensator could not apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackFailure {
    pub item_id: ItemId,
    pub replica: Replica,
    /// Units that should have been given back.
    pub quantity: u32,
    pub reason: String,
}

impl std::fmt::Display for RollbackFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} units of item {} on {} replica: {}",
            self.quantity, self.item_id, self.replica, self.reason
        )
    }
}

/// Errors that can occur while fulfilling an order or editing the catalog.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    /// The request failed validation before anything was written.
    #[error("Invalid request: {0}")]
    Invalid(#[from] DomainError),

    /// An item is missing from at least one replica.
    #[error("Item {item_id} not found in {replica} replica")]
    ItemNotFound { item_id: ItemId, replica: Replica },

    /// The two replicas disagree on an item's stock.
    #[error(
        "Replicas diverge for item {item_id}: relational has {relational}, document has {document}"
    )]
    ReplicaDivergence {
        item_id: ItemId,
        relational: StockRecord,
        document: StockRecord,
    },

    /// Not enough units on hand.
    #[error("Not enough stock for item {item_id}: available {available}, requested {requested}")]
    InsufficientStock {
        item_id: ItemId,
        available: u32,
        requested: u32,
    },

    /// One replica took the decrement and the other did not.
    #[error(
        "Reservation of {requested} units of item {item_id} failed on {failed_replica} replica ({reason}); \
         previous quantity {previous_quantity} {}",
        if *restored { "restored" } else { "NOT restored" }
    )]
    PartialReservationFailure {
        item_id: ItemId,
        requested: u32,
        previous_quantity: u32,
        failed_replica: Replica,
        reason: String,
        /// Whether the replica that did take the write was put back.
        restored: bool,
    },

    /// A replica could not be reached or rejected the call.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    /// Compensation after a failure did not fully restore stock.
    ///
    /// `cause` is the error that triggered compensation.
    #[error("{cause}; rollback failed for {}", format_failures(.failures))]
    RollbackFailed {
        cause: Box<FulfillmentError>,
        failures: Vec<RollbackFailure>,
    },

    /// The order record could not be written.
    #[error("Failed to persist order to {replica} replica: {source}")]
    OrderPersistFailure {
        replica: Replica,
        source: StoreError,
    },
}

fn format_failures(failures: &[RollbackFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl FulfillmentError {
    /// Returns the error that first blocked the operation, looking through
    /// rollback failures.
    pub fn root_cause(&self) -> &FulfillmentError {
        match self {
            Self::RollbackFailed { cause, .. } => cause.root_cause(),
            other => other,
        }
    }

    /// Returns the restorations that failed, if any.
    pub fn rollback_failures(&self) -> &[RollbackFailure] {
        match self {
            Self::RollbackFailed { failures, .. } => failures,
            _ => &[],
        }
    }
}

/// Convenience type alias for fulfillment results.
pub type Result<T> = std::result::Result<T, FulfillmentError>;
