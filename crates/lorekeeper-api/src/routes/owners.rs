//! Per-owner inspection: consistency scan and repair, in-flight entities.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use lorekeeper_consistency::DanglingReference;
use lorekeeper_core::ids::OwnerId;
use lorekeeper_jobs::JobView;
use lorekeeper_lifecycle::EntityStatus;
use serde::Serialize;
use tracing::{info, instrument};

use crate::error::ApiError;
use crate::state::AppState;

/// Response body for GET /consistency.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyReport {
    /// Owner partition.
    pub owner_id: OwnerId,
    /// References with no backing entity document.
    pub dangling: Vec<DanglingReference>,
}

/// Response body for POST /consistency/remediate.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemediationReport {
    /// Owner partition.
    pub owner_id: OwnerId,
    /// Creation jobs scheduled by this call.
    pub scheduled: usize,
}

/// Response body for GET /entities/pending.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingReport {
    /// Owner partition.
    pub owner_id: OwnerId,
    /// Entities still being created.
    pub entities: Vec<EntityStatus>,
    /// The owner's non-terminal jobs.
    pub jobs: Vec<JobView>,
}

/// GET /api/v1/owners/{owner}/consistency
#[instrument(skip(state))]
async fn scan(
    State(state): State<AppState>,
    Path(owner): Path<String>,
) -> Result<Json<ConsistencyReport>, ApiError> {
    let owner_id = OwnerId::new(owner);
    let dangling = state.validator.scan(&owner_id).await?;
    Ok(Json(ConsistencyReport { owner_id, dangling }))
}

/// POST /api/v1/owners/{owner}/consistency/remediate
#[instrument(skip(state))]
async fn remediate(
    State(state): State<AppState>,
    Path(owner): Path<String>,
) -> Result<Json<RemediationReport>, ApiError> {
    let owner_id = OwnerId::new(owner);
    let scheduled = state.validator.remediate(&owner_id).await?;
    info!(scheduled, "remediation requested");
    Ok(Json(RemediationReport {
        owner_id,
        scheduled,
    }))
}

/// GET /api/v1/owners/{owner}/entities/pending
#[instrument(skip(state))]
async fn pending(State(state): State<AppState>, Path(owner): Path<String>) -> Json<PendingReport> {
    let owner_id = OwnerId::new(owner);
    Json(PendingReport {
        entities: state.tracker.list_pending(&owner_id),
        jobs: state.queue.pending_jobs(&owner_id),
        owner_id,
    })
}

/// Returns the router for per-owner inspection.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{owner}/consistency", get(scan))
        .route("/{owner}/consistency/remediate", post(remediate))
        .route("/{owner}/entities/pending", get(pending))
}
