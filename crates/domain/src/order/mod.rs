//! Orders as persisted by each replica.

mod request;

pub use request::{DEFAULT_ORDER_STATUS, LineItem, OrderRequest, order_total};

use chrono::NaiveDate;
use common::OrderId;
use serde::{Deserialize, Serialize};

use crate::value_objects::Money;

/// A persisted order.
///
/// Line items are fixed at assembly time. The total is derived from the
/// unit costs captured while stock was reserved and is never negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub line_items: Vec<LineItem>,
    pub status: String,
    pub order_date: NaiveDate,
    pub delivery_date: NaiveDate,
    pub total_amount: Money,
}

/// An order record that has not been written yet.
///
/// The relational replica receives it with `id: None` and assigns the
/// identifier; the document replica receives it with that identifier set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub id: Option<OrderId>,
    pub line_items: Vec<LineItem>,
    pub status: String,
    pub order_date: NaiveDate,
    pub delivery_date: NaiveDate,
    pub total_amount: Money,
}

impl NewOrder {
    /// Builds the record for an accepted request and its computed total.
    pub fn from_request(request: OrderRequest, total_amount: Money) -> Self {
        Self {
            id: None,
            line_items: request.line_items,
            status: request.status,
            order_date: request.order_date,
            delivery_date: request.delivery_date,
            total_amount,
        }
    }

    /// Materializes the order under the given identifier.
    pub fn into_order(self, id: OrderId) -> Order {
        Order {
            id,
            line_items: self.line_items,
            status: self.status,
            order_date: self.order_date,
            delivery_date: self.delivery_date,
            total_amount: self.total_amount,
        }
    }
}

impl From<Order> for NewOrder {
    fn from(order: Order) -> Self {
        Self {
            id: Some(order.id),
            line_items: order.line_items,
            status: order.status,
            order_date: order.order_date,
            delivery_date: order.delivery_date,
            total_amount: order.total_amount,
        }
    }
}

/// Direct field update of an order.
///
/// Line items and total are not editable, so an update never needs to
/// touch stock.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPatch {
    pub status: Option<String>,
    pub order_date: Option<NaiveDate>,
    pub delivery_date: Option<NaiveDate>,
}

impl OrderPatch {
    pub fn status(status: impl Into<String>) -> Self {
        Self {
            status: Some(status.into()),
            ..Self::default()
        }
    }

    pub fn apply(&self, order: &mut Order) {
        if let Some(status) = &self.status {
            order.status = status.clone();
        }
        if let Some(date) = self.order_date {
            order.order_date = date;
        }
        if let Some(date) = self.delivery_date {
            order.delivery_date = date;
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}
