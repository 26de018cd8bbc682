//! Catalog ("piece") endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::ItemId;
use domain::{Item, ItemFilter, ItemPatch, Money, NewItem};
use replica_store::ReplicaStore;
use serde::{Deserialize, Serialize};

use super::{AmountInput, AppState, page, parse_id};
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct CreatePieceRequest {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub cost: AmountInput,
    pub quantity: u32,
    #[serde(default)]
    pub alert_limit: u32,
}

#[derive(Deserialize, Default)]
pub struct UpdatePieceRequest {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub cost: Option<AmountInput>,
    pub quantity: Option<u32>,
    pub alert_limit: Option<u32>,
}

/// `GET /pieces` query: field-equality filters plus the result window.
#[derive(Deserialize, Default)]
pub struct ListPiecesQuery {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub cost: Option<String>,
    pub quantity: Option<u32>,
    pub alert_limit: Option<u32>,
    pub offset: Option<u32>,
    pub limit: Option<u32>,
}

impl ListPiecesQuery {
    fn filter(&self) -> Result<ItemFilter, ApiError> {
        Ok(ItemFilter {
            name: self.name.clone(),
            kind: self.kind.clone(),
            unit_cost: self.cost.as_deref().map(Money::parse_decimal).transpose()?,
            quantity: self.quantity,
            alert_threshold: self.alert_limit,
        })
    }
}

// -- Response types --

#[derive(Serialize)]
pub struct PieceResponse {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub cost: String,
    pub quantity: u32,
    pub alert_limit: u32,
    pub low_stock: bool,
}

impl From<Item> for PieceResponse {
    fn from(item: Item) -> Self {
        Self {
            id: item.id.to_string(),
            low_stock: item.is_low_stock(),
            name: item.name,
            kind: item.kind,
            cost: item.unit_cost.to_string(),
            quantity: item.quantity,
            alert_limit: item.alert_threshold,
        }
    }
}

// -- Handlers --

/// POST /pieces: add an item to both replicas.
#[tracing::instrument(skip(state, req), fields(name = %req.name))]
pub async fn create<R, D>(
    State(state): State<Arc<AppState<R, D>>>,
    Json(req): Json<CreatePieceRequest>,
) -> Result<(StatusCode, Json<PieceResponse>), ApiError>
where
    R: ReplicaStore + Clone + 'static,
    D: ReplicaStore + Clone + 'static,
{
    let item = NewItem::new(
        req.name,
        req.kind,
        req.cost.to_money()?,
        req.quantity,
        req.alert_limit,
    );
    let created = state.catalog.create_item(item).await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

/// GET /pieces?name=&type=&cost=&quantity=&alert_limit=&offset=&limit=
pub async fn list<R, D>(
    State(state): State<Arc<AppState<R, D>>>,
    Query(query): Query<ListPiecesQuery>,
) -> Result<Json<Vec<PieceResponse>>, ApiError>
where
    R: ReplicaStore + Clone + 'static,
    D: ReplicaStore + Clone + 'static,
{
    let filter = query.filter()?;
    let items = state
        .catalog
        .list_items(&filter, page(query.offset, query.limit))
        .await?;
    Ok(Json(items.into_iter().map(Into::into).collect()))
}

/// GET /pieces/low-stock: items at or below their alert limit.
pub async fn low_stock<R, D>(
    State(state): State<Arc<AppState<R, D>>>,
) -> Result<Json<Vec<PieceResponse>>, ApiError>
where
    R: ReplicaStore + Clone + 'static,
    D: ReplicaStore + Clone + 'static,
{
    let items = state.catalog.low_stock_items().await?;
    Ok(Json(items.into_iter().map(Into::into).collect()))
}

/// GET /pieces/{id}
#[tracing::instrument(skip(state))]
pub async fn get<R, D>(
    State(state): State<Arc<AppState<R, D>>>,
    Path(id): Path<String>,
) -> Result<Json<PieceResponse>, ApiError>
where
    R: ReplicaStore + Clone + 'static,
    D: ReplicaStore + Clone + 'static,
{
    let item_id: ItemId = parse_id("piece", &id)?;
    let item = state
        .catalog
        .get_item(item_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Piece {id} not found")))?;
    Ok(Json(item.into()))
}

/// PATCH /pieces/{id}: partial update on both replicas.
#[tracing::instrument(skip(state, req))]
pub async fn update<R, D>(
    State(state): State<Arc<AppState<R, D>>>,
    Path(id): Path<String>,
    Json(req): Json<UpdatePieceRequest>,
) -> Result<Json<PieceResponse>, ApiError>
where
    R: ReplicaStore + Clone + 'static,
    D: ReplicaStore + Clone + 'static,
{
    let item_id: ItemId = parse_id("piece", &id)?;
    let patch = ItemPatch {
        name: req.name,
        kind: req.kind,
        unit_cost: req.cost.as_ref().map(AmountInput::to_money).transpose()?,
        quantity: req.quantity,
        alert_threshold: req.alert_limit,
    };
    if patch.is_empty() {
        return Err(ApiError::BadRequest("Nothing to update".to_string()));
    }

    let item = state
        .catalog
        .update_item(item_id, patch)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Piece {id} not found")))?;
    Ok(Json(item.into()))
}

/// DELETE /pieces/{id}
#[tracing::instrument(skip(state))]
pub async fn delete<R, D>(
    State(state): State<Arc<AppState<R, D>>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError>
where
    R: ReplicaStore + Clone + 'static,
    D: ReplicaStore + Clone + 'static,
{
    let item_id: ItemId = parse_id("piece", &id)?;
    if state.catalog.delete_item(item_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Piece {id} not found")))
    }
}
