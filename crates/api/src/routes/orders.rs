//! Order placement and management endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::NaiveDate;
use common::{ItemId, OrderId};
use domain::{LineItem, Money, Order, OrderFilter, OrderPatch, OrderRequest};
use replica_store::ReplicaStore;
use serde::{Deserialize, Serialize};

use super::{AppState, page, parse_id};
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct PlaceOrderRequest {
    pub pieces: Vec<OrderPiece>,
    pub status: Option<String>,
    pub order_date: NaiveDate,
    pub delivery_date: NaiveDate,
}

#[derive(Deserialize, Serialize)]
pub struct OrderPiece {
    pub id: String,
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct UpdateOrderRequest {
    pub status: Option<String>,
    pub order_date: Option<NaiveDate>,
    pub delivery_date: Option<NaiveDate>,
}

/// `GET /orders` query: field-equality filters plus the result window.
#[derive(Deserialize, Default)]
pub struct ListOrdersQuery {
    pub status: Option<String>,
    pub order_date: Option<NaiveDate>,
    pub delivery_date: Option<NaiveDate>,
    pub total_amount: Option<String>,
    pub offset: Option<u32>,
    pub limit: Option<u32>,
}

impl ListOrdersQuery {
    fn filter(&self) -> Result<OrderFilter, ApiError> {
        Ok(OrderFilter {
            status: self.status.clone(),
            order_date: self.order_date,
            delivery_date: self.delivery_date,
            total_amount: self
                .total_amount
                .as_deref()
                .map(Money::parse_decimal)
                .transpose()?,
        })
    }
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub pieces: Vec<OrderPiece>,
    pub status: String,
    pub order_date: NaiveDate,
    pub delivery_date: NaiveDate,
    pub total_amount: String,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id.to_string(),
            pieces: order
                .line_items
                .iter()
                .map(|line| OrderPiece {
                    id: line.item_id.to_string(),
                    quantity: line.quantity,
                })
                .collect(),
            status: order.status,
            order_date: order.order_date,
            delivery_date: order.delivery_date,
            total_amount: order.total_amount.to_string(),
        }
    }
}

// -- Handlers --

/// POST /orders: reserve stock and record the order on both replicas.
#[tracing::instrument(skip(state, req), fields(lines = req.pieces.len()))]
pub async fn create<R, D>(
    State(state): State<Arc<AppState<R, D>>>,
    Json(req): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError>
where
    R: ReplicaStore + Clone + 'static,
    D: ReplicaStore + Clone + 'static,
{
    let line_items = req
        .pieces
        .iter()
        .map(|piece| {
            let item_id: ItemId = parse_id("piece", &piece.id)?;
            Ok(LineItem::new(item_id, piece.quantity))
        })
        .collect::<Result<Vec<_>, ApiError>>()?;

    let mut request = OrderRequest::new(line_items, req.order_date, req.delivery_date);
    if let Some(status) = req.status {
        request = request.with_status(status);
    }

    let order = state.engine.place_order(request).await?;
    Ok((StatusCode::CREATED, Json(order.into())))
}

/// GET /orders?status=&order_date=&delivery_date=&total_amount=&offset=&limit=
pub async fn list<R, D>(
    State(state): State<Arc<AppState<R, D>>>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<Vec<OrderResponse>>, ApiError>
where
    R: ReplicaStore + Clone + 'static,
    D: ReplicaStore + Clone + 'static,
{
    let filter = query.filter()?;
    let orders = state
        .engine
        .list_orders(&filter, page(query.offset, query.limit))
        .await?;
    Ok(Json(orders.into_iter().map(Into::into).collect()))
}

/// GET /orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get<R, D>(
    State(state): State<Arc<AppState<R, D>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError>
where
    R: ReplicaStore + Clone + 'static,
    D: ReplicaStore + Clone + 'static,
{
    let order_id: OrderId = parse_id("order", &id)?;
    let order = state
        .engine
        .get_order(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))?;
    Ok(Json(order.into()))
}

/// PATCH /orders/{id}: change status or dates. Stock is not affected.
#[tracing::instrument(skip(state, req))]
pub async fn update<R, D>(
    State(state): State<Arc<AppState<R, D>>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateOrderRequest>,
) -> Result<Json<OrderResponse>, ApiError>
where
    R: ReplicaStore + Clone + 'static,
    D: ReplicaStore + Clone + 'static,
{
    let order_id: OrderId = parse_id("order", &id)?;
    let patch = OrderPatch {
        status: req.status,
        order_date: req.order_date,
        delivery_date: req.delivery_date,
    };
    if patch.is_empty() {
        return Err(ApiError::BadRequest("Nothing to update".to_string()));
    }

    let order = state
        .engine
        .update_order(order_id, patch)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))?;
    Ok(Json(order.into()))
}

/// DELETE /orders/{id}: remove the order. Reserved stock is not returned.
#[tracing::instrument(skip(state))]
pub async fn delete<R, D>(
    State(state): State<Arc<AppState<R, D>>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError>
where
    R: ReplicaStore + Clone + 'static,
    D: ReplicaStore + Clone + 'static,
{
    let order_id: OrderId = parse_id("order", &id)?;
    if state.engine.delete_order(order_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Order {id} not found")))
    }
}
