//! Single job detail.

use axum::extract::{Path, State};
use axum::Json;
use vid2audio_core::Error;

use super::parse_job_id;
use crate::jobs::Job;
use crate::server::{AppContext, AppError};

/// GET /api/jobs/{id}
#[utoipa::path(
    get,
    path = "/api/jobs/{id}",
    params(("id" = String, Path, description = "Job ID")),
    responses(
        (status = 200, description = "Job detail", body = Job),
        (status = 404, description = "Unknown job", body = crate::server::error::ErrorBody)
    )
)]
pub async fn get_job(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<Job>, AppError> {
    let id = parse_job_id(&id)?;
    ctx.scheduler
        .get_job(id)
        .map(Json)
        .ok_or_else(|| Error::not_found("job", id).into())
}
