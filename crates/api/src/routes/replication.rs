//! Document-replica catch-up endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use fulfillment::{PendingReplication, ReplayReport};
use replica_store::ReplicaStore;

use super::AppState;
use crate::error::ApiError;

/// GET /replication/pending: orders the document replica is missing.
pub async fn pending<R, D>(State(state): State<Arc<AppState<R, D>>>) -> Json<Vec<PendingReplication>>
where
    R: ReplicaStore + Clone + 'static,
    D: ReplicaStore + Clone + 'static,
{
    Json(state.engine.pending_replications().await)
}

/// POST /replication/replay: retry every pending order now.
#[tracing::instrument(skip(state))]
pub async fn replay<R, D>(
    State(state): State<Arc<AppState<R, D>>>,
) -> Result<Json<ReplayReport>, ApiError>
where
    R: ReplicaStore + Clone + 'static,
    D: ReplicaStore + Clone + 'static,
{
    Ok(Json(state.engine.replay_pending_replications().await?))
}
