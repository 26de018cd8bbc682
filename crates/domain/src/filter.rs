//! Field-equality filters and pagination for list queries.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::item::Item;
use crate::order::Order;
use crate::value_objects::Money;

/// Page size used when the caller gives none.
pub const DEFAULT_PAGE_LIMIT: u32 = 10;

/// Offset/limit window over an ordered result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub offset: u32,
    pub limit: u32,
}

impl Page {
    pub fn new(offset: u32, limit: u32) -> Self {
        Self { offset, limit }
    }

    /// Window covering every record. Used by internal full scans.
    pub fn all() -> Self {
        Self {
            offset: 0,
            limit: u32::MAX,
        }
    }

    /// Applies the window to an already ordered sequence.
    pub fn apply<T>(&self, records: impl IntoIterator<Item = T>) -> Vec<T> {
        records
            .into_iter()
            .skip(self.offset as usize)
            .take(self.limit as usize)
            .collect()
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(0, DEFAULT_PAGE_LIMIT)
    }
}

/// Item filter. Every set field must match exactly; unset fields match all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFilter {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub unit_cost: Option<Money>,
    pub quantity: Option<u32>,
    pub alert_threshold: Option<u32>,
}

impl ItemFilter {
    pub fn matches(&self, item: &Item) -> bool {
        self.name.as_ref().is_none_or(|name| *name == item.name)
            && self.kind.as_ref().is_none_or(|kind| *kind == item.kind)
            && self.unit_cost.is_none_or(|cost| cost == item.unit_cost)
            && self.quantity.is_none_or(|q| q == item.quantity)
            && self.alert_threshold.is_none_or(|a| a == item.alert_threshold)
    }
}

/// Order filter. Every set field must match exactly; unset fields match all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFilter {
    pub status: Option<String>,
    pub order_date: Option<NaiveDate>,
    pub delivery_date: Option<NaiveDate>,
    pub total_amount: Option<Money>,
}

impl OrderFilter {
    pub fn matches(&self, order: &Order) -> bool {
        self.status.as_ref().is_none_or(|status| *status == order.status)
            && self.order_date.is_none_or(|date| date == order.order_date)
            && self.delivery_date.is_none_or(|date| date == order.delivery_date)
            && self.total_amount.is_none_or(|total| total == order.total_amount)
    }
}
