//! Domain error types.

use common::ItemId;
use thiserror::Error;

use crate::value_objects::Money;

/// Validation errors raised before anything touches a replica.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// An order request carried no line items.
    #[error("Order must contain at least one line item")]
    EmptyOrder,

    /// A line item requested zero units.
    #[error("Invalid quantity {quantity} for item {item_id}: must be positive")]
    InvalidQuantity { item_id: ItemId, quantity: u32 },

    /// An item was given a blank name.
    #[error("Item name must not be empty")]
    EmptyName,

    /// An item was given a negative unit cost.
    #[error("Invalid unit cost {0}: must not be negative")]
    NegativeCost(Money),

    /// A monetary string could not be parsed.
    #[error("Invalid money amount: '{0}'")]
    InvalidAmount(String),

    /// The order total does not fit in the money representation.
    #[error("Order total overflowed")]
    AmountOverflow,
}
