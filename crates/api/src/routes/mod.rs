//! HTTP handlers.

pub mod health;
pub mod metrics;
pub mod orders;
pub mod pieces;
pub mod replication;

use std::str::FromStr;
use std::sync::Arc;

use domain::{DEFAULT_PAGE_LIMIT, Money, Page};
use fulfillment::{Catalog, FulfillmentEngine};
use serde::Deserialize;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<R, D> {
    pub engine: Arc<FulfillmentEngine<R, D>>,
    pub catalog: Catalog<R, D>,
}

/// Parses a path identifier, answering 400 when it is not a UUID.
pub(crate) fn parse_id<T: FromStr>(kind: &str, raw: &str) -> Result<T, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid {kind} id: {raw}")))
}

/// Builds the result window from `?offset=&limit=`, defaulting to the first page.
pub(crate) fn page(offset: Option<u32>, limit: Option<u32>) -> Page {
    Page::new(offset.unwrap_or(0), limit.unwrap_or(DEFAULT_PAGE_LIMIT))
}

/// A monetary amount given either as a JSON number or a decimal string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AmountInput {
    Number(serde_json::Number),
    Text(String),
}

impl AmountInput {
    pub fn to_money(&self) -> Result<Money, ApiError> {
        let text = match self {
            AmountInput::Number(n) => n.to_string(),
            AmountInput::Text(s) => s.clone(),
        };
        Ok(Money::parse_decimal(&text)?)
    }
}
