//! Job submission and result polling.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use lorekeeper_core::error::GameError;
use lorekeeper_core::ids::OwnerId;
use lorekeeper_jobs::{Delivery, JobId, JobKind, JobSubmitter, PollResult, UnitOfWork};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{ApiError, ErrorBody};
use crate::state::AppState;

/// Request body for POST /api/v1/jobs.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobRequest {
    /// The player/session the job acts for.
    pub owner_id: String,
    /// `player_action` or `end_combat`.
    pub kind: JobKind,
    /// Kind-specific parameters, e.g. `{"action": "..."}`.
    #[serde(default)]
    pub payload: Value,
}

/// Response body for an accepted job.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAccepted {
    /// Poll `GET /api/v1/jobs/{jobId}` for the result.
    pub job_id: JobId,
    /// Owner partition.
    pub owner_id: OwnerId,
    /// Job kind.
    pub kind: JobKind,
}

/// POST /api/v1/jobs
///
/// Only interactive kinds are accepted; background work is scheduled by the
/// engine itself.
#[instrument(skip(state, request), fields(owner = %request.owner_id, kind = %request.kind))]
async fn submit_job(
    State(state): State<AppState>,
    Json(request): Json<SubmitJobRequest>,
) -> Result<(StatusCode, Json<JobAccepted>), ApiError> {
    let owner_id = request.owner_id.trim();
    if owner_id.is_empty() {
        return Err(GameError::Validation("ownerId must not be empty".into()).into());
    }
    if request.kind.delivery() != Delivery::Interactive {
        return Err(GameError::Validation(format!(
            "{} jobs are scheduled by the engine and cannot be submitted",
            request.kind
        ))
        .into());
    }

    let handle = state.queue.submit(UnitOfWork::new(
        OwnerId::new(owner_id),
        request.kind,
        request.payload,
    ));
    info!(job_id = %handle.id, "job accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(JobAccepted {
            job_id: handle.id,
            owner_id: handle.owner,
            kind: handle.kind,
        }),
    ))
}

/// GET /api/v1/jobs/{job_id}
///
/// Waits up to the configured poll timeout. A terminal result is handed out
/// once; polling again afterwards answers 404.
#[instrument(skip(state))]
async fn poll_job(State(state): State<AppState>, Path(job_id): Path<Uuid>) -> Response {
    let id = JobId::from_uuid(job_id);
    let result = if state.poll_timeout.is_zero() {
        state.queue.poll(id)
    } else {
        state.queue.await_id(id, state.poll_timeout).await
    };

    match result {
        PollResult::Pending => Json(json!({ "status": "pending" })).into_response(),
        PollResult::Ready(result) => Json(result).into_response(),
        PollResult::Unknown => ErrorBody::respond(
            StatusCode::NOT_FOUND,
            "job_not_found",
            format!("job {id} is unknown or its result was already read"),
        ),
    }
}

/// Returns the router for job submission and polling.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(submit_job))
        .route("/{job_id}", get(poll_job))
}
