//! Task handlers: archive submission and status polling.

use super::ToCbzQuery;
use crate::api::AppState;
use crate::api::loopback::empty_not_found;
use crate::jobs::{JobKey, JobSnapshot};
use axum::{
    Json,
    extract::{Path, Query, State, rejection::QueryRejection},
    response::{IntoResponse, Response},
};

/// GET /to_cbz - Submit an archive request and return its current status
///
/// Idempotent: repeating the call for the same parameters never starts a
/// second build while one is scheduled, running or completed. Clients call
/// it (or `/task/{id}/status`) repeatedly until `status` is `completed`.
#[utoipa::path(
    get,
    path = "/to_cbz",
    tag = "tasks",
    params(ToCbzQuery),
    responses(
        (status = 200, description = "Current job snapshot", body = crate::jobs::JobSnapshot),
        (status = 404, description = "Missing or malformed parameters")
    )
)]
pub async fn to_cbz(
    State(state): State<AppState>,
    query: Result<Query<ToCbzQuery>, QueryRejection>,
) -> Response {
    let request = match query.map(|Query(q)| q.into_request()) {
        Ok(Ok(request)) => request,
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "rejected archive request");
            return empty_not_found();
        }
        Err(_) => return empty_not_found(),
    };

    Json(state.engine.submit(request)).into_response()
}

/// GET /task/:id/status - Poll a job
#[utoipa::path(
    get,
    path = "/task/{id}/status",
    tag = "tasks",
    params(
        ("id" = String, Path, description = "Task id returned by /to_cbz")
    ),
    responses(
        (status = 200, description = "Job snapshot; `unknown task` for ids never submitted", body = crate::jobs::JobSnapshot)
    )
)]
pub async fn task_status(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let snapshot = match JobKey::parse(&id) {
        Some(key) => state.engine.poll(&key),
        None => JobSnapshot {
            task_id: id,
            status: "unknown task".into(),
            progress: None,
            url: None,
        },
    };
    Json(snapshot).into_response()
}
