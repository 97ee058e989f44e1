//! Polling view of the queue.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::jobs::JobSummary;
use crate::server::AppContext;

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatusResponse {
    pub queue: Vec<JobSummary>,
    /// Suggested delay between polls.
    pub poll_interval_secs: u64,
}

/// GET /api/queue-status
///
/// Returns the same listing push observers were last sent.
#[utoipa::path(
    get,
    path = "/api/queue-status",
    responses(
        (status = 200, description = "Every known job", body = QueueStatusResponse)
    )
)]
pub async fn queue_status(State(ctx): State<AppContext>) -> Json<QueueStatusResponse> {
    Json(QueueStatusResponse {
        queue: ctx.notifier.snapshot().as_ref().clone(),
        poll_interval_secs: ctx.config.queue.poll_interval_secs,
    })
}
