//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use replica_store::ReplicaStore;
use serde::Serialize;

use super::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Orders still waiting to reach the document replica.
    pub pending_replications: usize,
}

/// GET /health: process liveness plus replication backlog.
pub async fn check<R, D>(State(state): State<Arc<AppState<R, D>>>) -> Json<HealthResponse>
where
    R: ReplicaStore + Clone + 'static,
    D: ReplicaStore + Clone + 'static,
{
    let pending_replications = state.engine.pending_replications().await.len();
    Json(HealthResponse {
        status: if pending_replications == 0 { "ok" } else { "degraded" },
        pending_replications,
    })
}
