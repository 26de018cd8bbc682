//! Domain layer for the dual-replica inventory system.
//!
//! This crate provides the records both replicas persist and the checks
//! that run before anything is written:
//! - `Item` ("piece") with its `{quantity, cost}` stock record
//! - `Order`, `OrderRequest` and the order total computation
//! - `Money` with two-decimal semantics
//! - `ItemFilter`, `OrderFilter` and `Page` for list queries

pub mod error;
pub mod filter;
pub mod item;
pub mod order;
pub mod value_objects;

pub use error::DomainError;
pub use filter::{DEFAULT_PAGE_LIMIT, ItemFilter, OrderFilter, Page};
pub use item::{Item, ItemPatch, NewItem, StockRecord};
pub use order::{
    DEFAULT_ORDER_STATUS, LineItem, NewOrder, Order, OrderPatch, OrderRequest, order_total,
};
pub use value_objects::Money;
