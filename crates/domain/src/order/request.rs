//! What a caller submits when placing an order.

use chrono::NaiveDate;
use common::ItemId;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_objects::Money;

/// Status given to orders when the caller does not supply one.
pub const DEFAULT_ORDER_STATUS: &str = "created";

/// One requested `{item, quantity}` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub item_id: ItemId,
    pub quantity: u32,
}

impl LineItem {
    pub fn new(item_id: ItemId, quantity: u32) -> Self {
        Self { item_id, quantity }
    }
}

/// A candidate order as received from the order intake surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub line_items: Vec<LineItem>,
    pub status: String,
    pub order_date: NaiveDate,
    pub delivery_date: NaiveDate,
}

impl OrderRequest {
    /// Creates a request with the default status.
    pub fn new(line_items: Vec<LineItem>, order_date: NaiveDate, delivery_date: NaiveDate) -> Self {
        Self {
            line_items,
            status: DEFAULT_ORDER_STATUS.to_string(),
            order_date,
            delivery_date,
        }
    }

    /// Overrides the status.
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    /// Rejects empty orders and zero quantities.
    ///
    /// The same item may appear on several lines; each line is reserved
    /// on its own.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.line_items.is_empty() {
            return Err(DomainError::EmptyOrder);
        }
        if let Some(line) = self.line_items.iter().find(|line| line.quantity == 0) {
            return Err(DomainError::InvalidQuantity {
                item_id: line.item_id,
                quantity: line.quantity,
            });
        }
        Ok(())
    }
}

/// Sums `unit_cost × quantity` over the given lines.
///
/// Fails instead of wrapping when the total does not fit.
pub fn order_total<I>(lines: I) -> Result<Money, DomainError>
where
    I: IntoIterator<Item = (Money, u32)>,
{
    lines
        .into_iter()
        .try_fold(Money::zero(), |total, (unit_cost, quantity)| {
            unit_cost
                .checked_multiply(quantity)
                .and_then(|line| total.checked_add(line))
                .ok_or(DomainError::AmountOverflow)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    #[test]
    fn test_request_defaults_to_created() {
        let request = OrderRequest::new(vec![LineItem::new(ItemId::new(), 1)], date(1), date(5));
        assert_eq!(request.status, "created");
        assert_eq!(request.with_status("urgent").status, "urgent");
    }

    #[test]
    fn test_validate_rejects_empty_order() {
        let request = OrderRequest::new(vec![], date(1), date(5));
        assert_eq!(request.validate(), Err(DomainError::EmptyOrder));
    }

    #[test]
    fn test_validate_rejects_zero_quantity() {
        let bad = ItemId::new();
        let request = OrderRequest::new(
            vec![LineItem::new(ItemId::new(), 2), LineItem::new(bad, 0)],
            date(1),
            date(5),
        );
        assert_eq!(
            request.validate(),
            Err(DomainError::InvalidQuantity {
                item_id: bad,
                quantity: 0
            })
        );
    }

    #[test]
    fn test_order_total() {
        let total = order_total([(Money::from_cents(1000), 2), (Money::from_cents(500), 1)]).unwrap();
        assert_eq!(total, Money::from_cents(2500));
        assert_eq!(total.to_string(), "25.00");
    }

    #[test]
    fn test_order_total_of_nothing_is_zero() {
        assert_eq!(order_total([]).unwrap(), Money::zero());
    }

    #[test]
    fn test_order_total_overflow() {
        let result = order_total([(Money::from_cents(i64::MAX / 2), 3)]);
        assert_eq!(result, Err(DomainError::AmountOverflow));
    }
}
