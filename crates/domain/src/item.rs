//! Catalog items ("pieces").

use common::ItemId;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_objects::Money;

/// A catalog item as held by one replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    /// Category of the item.
    #[serde(rename = "type")]
    pub kind: String,
    pub unit_cost: Money,
    /// Units on hand. Unsigned, so a replica can never report negative stock.
    pub quantity: u32,
    /// Informational only; nothing reacts to it automatically.
    pub alert_threshold: u32,
}

impl Item {
    /// Returns the `{quantity, cost}` pair the fulfillment engine works with.
    pub fn stock(&self) -> StockRecord {
        StockRecord {
            quantity: self.quantity,
            unit_cost: self.unit_cost,
        }
    }

    /// Returns true when stock has dropped to or below the alert threshold.
    pub fn is_low_stock(&self) -> bool {
        self.quantity <= self.alert_threshold
    }
}

/// The stock-relevant slice of an item: quantity on hand and unit cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecord {
    pub quantity: u32,
    pub unit_cost: Money,
}

impl std::fmt::Display for StockRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} @ {}", self.quantity, self.unit_cost)
    }
}

/// An item that has not been written to any replica yet.
///
/// `id` is `None` when the item goes to the relational replica, which
/// assigns the identifier. The document replica then receives the same
/// record with `id` set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewItem {
    pub id: Option<ItemId>,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub unit_cost: Money,
    pub quantity: u32,
    pub alert_threshold: u32,
}

impl NewItem {
    /// Creates a new item description without an identifier.
    pub fn new(
        name: impl Into<String>,
        kind: impl Into<String>,
        unit_cost: Money,
        quantity: u32,
        alert_threshold: u32,
    ) -> Self {
        Self {
            id: None,
            name: name.into(),
            kind: kind.into(),
            unit_cost,
            quantity,
            alert_threshold,
        }
    }

    /// Returns a copy carrying an already-assigned identifier.
    pub fn with_id(&self, id: ItemId) -> Self {
        Self {
            id: Some(id),
            ..self.clone()
        }
    }

    /// Checks the name and cost before the item is written anywhere.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::EmptyName);
        }
        if self.unit_cost.is_negative() {
            return Err(DomainError::NegativeCost(self.unit_cost));
        }
        Ok(())
    }

    /// Materializes the item under the given identifier.
    pub fn into_item(self, id: ItemId) -> Item {
        Item {
            id,
            name: self.name,
            kind: self.kind,
            unit_cost: self.unit_cost,
            quantity: self.quantity,
            alert_threshold: self.alert_threshold,
        }
    }
}

/// Partial update of an item's editable fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPatch {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub unit_cost: Option<Money>,
    pub quantity: Option<u32>,
    pub alert_threshold: Option<u32>,
}

impl ItemPatch {
    /// Patch that only sets the quantity.
    pub fn quantity(quantity: u32) -> Self {
        Self {
            quantity: Some(quantity),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if let Some(name) = &self.name
            && name.trim().is_empty()
        {
            return Err(DomainError::EmptyName);
        }
        if let Some(cost) = self.unit_cost
            && cost.is_negative()
        {
            return Err(DomainError::NegativeCost(cost));
        }
        Ok(())
    }

    /// Applies every present field to `item`.
    pub fn apply(&self, item: &mut Item) {
        if let Some(name) = &self.name {
            item.name = name.clone();
        }
        if let Some(kind) = &self.kind {
            item.kind = kind.clone();
        }
        if let Some(cost) = self.unit_cost {
            item.unit_cost = cost;
        }
        if let Some(quantity) = self.quantity {
            item.quantity = quantity;
        }
        if let Some(alert) = self.alert_threshold {
            item.alert_threshold = alert;
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}
